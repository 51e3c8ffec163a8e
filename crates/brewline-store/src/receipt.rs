use crate::layout::PrefixLayout;
use crate::{fsync_dir, StoreError};
use brewline_schema::PackageName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Record of one successful install, kept under the prefix's state dir.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub source_url: String,
    pub checksum: String,
    /// Absolute paths of every file or symlink the install wrote.
    pub installed_files: Vec<PathBuf>,
    pub installed_at: String,
}

pub struct ReceiptStore {
    layout: PrefixLayout,
}

impl ReceiptStore {
    pub fn new(layout: PrefixLayout) -> Self {
        Self { layout }
    }

    /// Receipt file for `name`, refusing names that could leave the receipts dir.
    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        PackageName::parse(name)
            .map(|n| self.layout.receipt_path(n.as_str()))
            .ok_or_else(|| StoreError::InvalidPackageName(name.to_owned()))
    }

    /// Write atomically, replacing any receipt from an earlier install.
    pub fn put(&self, receipt: &Receipt) -> Result<PathBuf, StoreError> {
        let dest = self.path_for(&receipt.name)?;
        let dir = self.layout.receipts_dir();
        fs::create_dir_all(&dir)?;
        let content = serde_json::to_string_pretty(receipt)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(dest)
    }

    pub fn get(&self, name: &str) -> Result<Receipt, StoreError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(StoreError::ReceiptNotFound(name.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_ok_and(|p| p.exists())
    }

    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Receipt>, StoreError> {
        let dir = self.layout.receipts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name
                .to_str()
                .filter(|n| !n.starts_with('.'))
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            match self.get(name) {
                Ok(receipt) => results.push(receipt),
                Err(e) => {
                    tracing::warn!("skipping unreadable receipt '{name}': {e}");
                }
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}
