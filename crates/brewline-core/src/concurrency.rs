use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exclusive advisory lock on an install prefix, released on drop.
pub struct PrefixLock {
    lock_file: File,
}

impl PrefixLock {
    fn open(lock_path: &Path) -> Result<File, CoreError> {
        let lock_err = |source| CoreError::Lock {
            path: lock_path.to_path_buf(),
            source,
        };
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(lock_err)
    }

    /// Block until the lock is held.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = Self::open(lock_path)?;
        file.lock_exclusive().map_err(|source| CoreError::Lock {
            path: lock_path.to_path_buf(),
            source,
        })?;
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = Self::open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Cooperative cancellation flag shared between the signal handler, the
/// pipeline and running child processes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Route Ctrl-C to `token`. A second Ctrl-C exits immediately.
pub fn install_signal_handler(token: &CancelToken) {
    let token = token.clone();
    let _ = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
        eprintln!("\ncancellation requested, stopping after the current step...");
    });
}
