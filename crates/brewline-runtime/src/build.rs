use crate::prereq::check_build_dependencies;
use crate::process::{CommandRunner, CommandSpec, ProcessOutput};
use crate::RuntimeError;
use brewline_schema::{ArtifactName, Manifest};
use brewline_store::extract_archive;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lines of build output kept in a [`RuntimeError::BuildFailed`].
pub const OUTPUT_TAIL_LINES: usize = 40;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub timeout: Duration,
    pub check_dependencies: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            check_dependencies: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Directory the build command ran in.
    pub source_root: PathBuf,
    /// Produced executables by file name, sorted.
    pub artifacts: BTreeMap<ArtifactName, PathBuf>,
    pub output: ProcessOutput,
}

pub struct Builder {
    runner: Arc<dyn CommandRunner>,
    options: BuildOptions,
}

impl Builder {
    pub fn new(runner: Arc<dyn CommandRunner>, options: BuildOptions) -> Self {
        Self { runner, options }
    }

    /// Extract `archive` under `work_dir`, run the build command in the
    /// source root and collect what it produced.
    ///
    /// `archive` must already be verified; nothing here looks at checksums.
    pub fn build(
        &self,
        manifest: &Manifest,
        archive: &Path,
        work_dir: &Path,
    ) -> Result<BuildOutput, RuntimeError> {
        if self.options.check_dependencies {
            let missing = check_build_dependencies(&manifest.build_dependencies);
            if !missing.is_empty() {
                return Err(RuntimeError::MissingDependencies(missing));
            }
        }

        let source_root = extract_archive(archive, &work_dir.join("src"))?;
        debug!("source root: {}", source_root.display());

        let command = CommandSpec::from_tokens(&manifest.build_command)
            .ok_or_else(|| RuntimeError::InvalidCommand("empty build_command".to_owned()))?;
        info!("building {} with `{command}`", manifest.name);
        let output = self
            .runner
            .run(&command, &source_root, self.options.timeout)?;

        if !output.success() {
            return Err(RuntimeError::BuildFailed {
                exit_code: output.exit_code.unwrap_or(-1),
                output: output.tail(OUTPUT_TAIL_LINES),
            });
        }

        let artifacts = collect_artifacts(&source_root, &manifest.artifact_dirs)?;
        if artifacts.is_empty() {
            warn!(
                "build of {} produced no executables in {:?}",
                manifest.name, manifest.artifact_dirs
            );
        } else {
            debug!(
                "artifacts: {:?}",
                artifacts.keys().map(ArtifactName::as_str).collect::<Vec<_>>()
            );
        }

        Ok(BuildOutput {
            source_root,
            artifacts,
            output,
        })
    }
}

/// Executable regular files directly inside each artifact directory.
///
/// Earlier directories win when two contain the same file name.
pub fn collect_artifacts(
    root: &Path,
    artifact_dirs: &[String],
) -> Result<BTreeMap<ArtifactName, PathBuf>, RuntimeError> {
    let mut artifacts = BTreeMap::new();
    for dir in artifact_dirs {
        let path = root.join(dir);
        if !path.is_dir() {
            debug!("artifact dir {} does not exist", path.display());
            continue;
        }
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if !file_type.is_file() {
                continue;
            }
            if entry.metadata()?.permissions().mode() & 0o111 == 0 {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(ArtifactName::new) else {
                continue;
            };
            artifacts.entry(name).or_insert_with(|| entry.path());
        }
    }
    Ok(artifacts)
}
