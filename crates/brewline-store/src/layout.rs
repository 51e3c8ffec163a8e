use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout of an install prefix.
///
/// Artifacts go to `bin/`; brewline's own state (receipts, lock) lives under
/// `var/brewline/`. Directories are created on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct PrefixLayout {
    root: PathBuf,
}

impl PrefixLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    #[inline]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("var").join("brewline")
    }

    #[inline]
    pub fn receipts_dir(&self) -> PathBuf {
        self.state_dir().join("receipts")
    }

    #[inline]
    pub fn receipt_path(&self, name: &str) -> PathBuf {
        self.receipts_dir().join(format!("{name}.json"))
    }

    /// Advisory lock serializing installs into this prefix.
    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.state_dir().join(".lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.bin_dir())?;
        fs::create_dir_all(self.receipts_dir())?;
        Ok(())
    }
}
