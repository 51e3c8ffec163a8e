use crate::layout::PrefixLayout;
use crate::receipt::{Receipt, ReceiptStore};
use crate::{fsync_dir, StoreError};
use brewline_schema::{ArtifactName, InstallMapping, Manifest};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const EXECUTABLE_MODE: u32 = 0o755;

/// One file the installer wrote under `<prefix>/bin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFile {
    pub alias: ArtifactName,
    pub path: PathBuf,
    pub symlink: bool,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub installed: Vec<InstalledFile>,
    pub receipt: PathBuf,
}

impl InstallReport {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.installed.iter().map(|f| f.path.clone()).collect()
    }
}

/// Places build artifacts into a prefix according to a manifest's mappings.
///
/// Not transactional: when a mapping fails, files written by earlier
/// mappings stay in place and are listed in the error.
pub struct Installer {
    layout: PrefixLayout,
}

impl Installer {
    pub fn new(layout: PrefixLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &PrefixLayout {
        &self.layout
    }

    pub fn install(
        &self,
        manifest: &Manifest,
        artifacts: &BTreeMap<ArtifactName, PathBuf>,
    ) -> Result<InstallReport, StoreError> {
        self.layout.initialize()?;
        let bin = self.layout.bin_dir();
        let mappings = plan_mappings(manifest, artifacts);
        let mut installed: Vec<InstalledFile> = Vec::with_capacity(mappings.len());

        for mapping in &mappings {
            if let Err(e) = self.apply(mapping, artifacts, &bin, &mut installed) {
                if !installed.is_empty() {
                    warn!(
                        "partial install of {}: {} file(s) left in {} after failure",
                        manifest.name,
                        installed.len(),
                        bin.display()
                    );
                }
                return Err(e);
            }
        }
        fsync_dir(&bin)?;

        let receipt = Receipt {
            name: manifest.name.to_string(),
            version: manifest.resolved_version(),
            source_url: manifest.source_url.clone(),
            checksum: manifest.checksum.to_string(),
            installed_files: installed.iter().map(|f| f.path.clone()).collect(),
            installed_at: chrono::Utc::now().to_rfc3339(),
        };
        let receipt = ReceiptStore::new(self.layout.clone()).put(&receipt)?;
        info!(
            "installed {} file(s) for {} into {}",
            installed.len(),
            manifest.name,
            bin.display()
        );

        Ok(InstallReport {
            installed,
            receipt,
        })
    }

    fn apply(
        &self,
        mapping: &InstallMapping,
        artifacts: &BTreeMap<ArtifactName, PathBuf>,
        bin: &Path,
        installed: &mut Vec<InstalledFile>,
    ) -> Result<(), StoreError> {
        let Some(source) = artifacts.get(&mapping.artifact) else {
            return Err(StoreError::MissingArtifact {
                missing_artifact: mapping.artifact.to_string(),
                installed: installed.iter().map(|f| f.path.clone()).collect(),
            });
        };

        if mapping.symlink {
            let already_copied = installed
                .iter()
                .any(|f| !f.symlink && f.alias == mapping.artifact);
            if !already_copied {
                let target = bin.join(mapping.artifact.as_str());
                copy_executable(source, bin, &target)?;
                installed.push(InstalledFile {
                    alias: mapping.artifact.clone(),
                    path: target,
                    symlink: false,
                });
            }
            let link = bin.join(mapping.alias.as_str());
            replace_symlink(Path::new(mapping.artifact.as_str()), bin, &link)?;
            debug!("linked {} -> {}", link.display(), mapping.artifact);
            installed.push(InstalledFile {
                alias: mapping.alias.clone(),
                path: link,
                symlink: true,
            });
        } else {
            let dest = bin.join(mapping.alias.as_str());
            copy_executable(source, bin, &dest)?;
            debug!("installed {} -> {}", source.display(), dest.display());
            installed.push(InstalledFile {
                alias: mapping.alias.clone(),
                path: dest,
                symlink: false,
            });
        }
        Ok(())
    }

    /// Remove the files recorded in `name`'s receipt, then the receipt.
    ///
    /// Only paths inside `<prefix>/bin` are touched; entries already gone are
    /// skipped. Returns the paths removed.
    pub fn uninstall(&self, name: &str) -> Result<Vec<PathBuf>, StoreError> {
        let receipts = ReceiptStore::new(self.layout.clone());
        let receipt = receipts.get(name)?;
        let bin = self.layout.bin_dir();

        let mut removed = Vec::new();
        for path in &receipt.installed_files {
            let escapes = path.components().any(|c| c == Component::ParentDir);
            if escapes || !path.starts_with(&bin) {
                warn!("not removing {}: outside {}", path.display(), bin.display());
                continue;
            }
            match fs::symlink_metadata(path) {
                Ok(_) => {
                    fs::remove_file(path)?;
                    removed.push(path.clone());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("already absent: {}", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        receipts.remove(name)?;
        info!("uninstalled {name}: removed {} file(s)", removed.len());
        Ok(removed)
    }
}

/// Explicit mappings, or every produced artifact under its own name.
fn plan_mappings(
    manifest: &Manifest,
    artifacts: &BTreeMap<ArtifactName, PathBuf>,
) -> Vec<InstallMapping> {
    if !manifest.install_mappings.is_empty() {
        return manifest.install_mappings.clone();
    }
    artifacts
        .keys()
        .map(|name| InstallMapping {
            artifact: name.clone(),
            alias: name.clone(),
            symlink: false,
        })
        .collect()
}

/// Copy via a temp file in `dir` and rename over `dest`, so an existing
/// file or symlink is replaced in one step.
fn copy_executable(source: &Path, dir: &Path, dest: &Path) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    let mut src = File::open(source)?;
    io::copy(&mut src, tmp.as_file_mut())?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(EXECUTABLE_MODE))?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn replace_symlink(target: &Path, dir: &Path, link: &Path) -> Result<(), StoreError> {
    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = dir.join(format!(".{file_name}.brewline-link"));
    if fs::symlink_metadata(&staging).is_ok() {
        fs::remove_file(&staging)?;
    }
    symlink(target, &staging)?;
    fs::rename(&staging, link)?;
    Ok(())
}
