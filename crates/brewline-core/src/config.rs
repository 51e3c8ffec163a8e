use crate::CoreError;
use brewline_fetch::FetchOptions;
use brewline_runtime::BuildOptions;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "BREWLINE_CONFIG";
pub const PREFIX_ENV: &str = "BREWLINE_PREFIX";

/// Settings threaded through one pipeline run.
///
/// Loaded from `~/.config/brewline/config.json` (or `$BREWLINE_CONFIG`);
/// a missing file means defaults. `BREWLINE_PREFIX` and CLI flags override
/// file values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Install root; `~/.local` when unset.
    pub prefix: Option<PathBuf>,
    /// Where per-run scratch directories are created; system temp when unset.
    pub work_dir: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    pub build_timeout_secs: u64,
    pub smoke_timeout_secs: u64,
    pub max_redirects: u32,
    pub check_build_dependencies: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            work_dir: None,
            fetch_timeout_secs: 300,
            build_timeout_secs: 3600,
            smoke_timeout_secs: 60,
            max_redirects: 10,
            check_build_dependencies: true,
        }
    }
}

impl PipelineConfig {
    /// Load from `$BREWLINE_CONFIG`, else `~/.config/brewline/config.json`.
    pub fn load_default() -> Result<Self, CoreError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => match default_config_path() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `BREWLINE_PREFIX` from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(prefix) = lookup(PREFIX_ENV).filter(|p| !p.is_empty()) {
            self.prefix = Some(PathBuf::from(prefix));
        }
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Absolute install root. A relative prefix is taken against the
    /// current directory, so receipts and `{bin}` never depend on a later cwd.
    pub fn resolved_prefix(&self) -> Result<PathBuf, CoreError> {
        let prefix = match &self.prefix {
            Some(prefix) => prefix.clone(),
            None => {
                let home = std::env::var_os("HOME").ok_or_else(|| {
                    CoreError::Config("HOME not set and no prefix configured".to_owned())
                })?;
                PathBuf::from(home).join(".local")
            }
        };
        std::path::absolute(&prefix)
            .map(|p| normalize(&p))
            .map_err(|e| {
                CoreError::Config(format!("cannot resolve prefix {}: {e}", prefix.display()))
            })
    }

    pub fn resolved_work_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => std::path::absolute(dir).unwrap_or_else(|_| dir.clone()),
            None => std::env::temp_dir(),
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
            .with_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_max_redirects(self.max_redirects)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            timeout: Duration::from_secs(self.build_timeout_secs),
            check_dependencies: self.check_build_dependencies,
        }
    }

    pub fn smoke_timeout(&self) -> Duration {
        Duration::from_secs(self.smoke_timeout_secs)
    }
}

/// Drop `.` and fold `..` without touching the filesystem, so the same
/// prefix spelled two ways yields the same receipt paths.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/brewline/config.json"))
}
