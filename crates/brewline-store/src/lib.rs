//! Integrity verification, source extraction, and prefix installation for brewline.
//!
//! This crate provides the storage layer: `PrefixLayout` for the install
//! prefix directory structure, checksum computation and verification
//! (`verify_file`), archive extraction (`extract_archive`), the `Installer`
//! that places build artifacts under `<prefix>/bin`, and `ReceiptStore` for
//! per-package install receipts.

pub mod archive;
pub mod digest;
pub mod install;
pub mod layout;
pub mod receipt;

pub use archive::{extract_archive, source_root, ArchiveFormat};
pub use digest::{hash_bytes, hash_file, verify_file};
pub use install::{InstallReport, InstalledFile, Installer};
pub use layout::PrefixLayout;
pub use receipt::{Receipt, ReceiptStore};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("archive error: {0}")]
    Archive(String),
    #[error("build did not produce artifact '{missing_artifact}' ({} file(s) already installed)", installed.len())]
    MissingArtifact {
        missing_artifact: String,
        installed: Vec<PathBuf>,
    },
    #[error("'{0}' is not a valid package name")]
    InvalidPackageName(String),
    #[error("no install receipt for '{0}'")]
    ReceiptNotFound(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
