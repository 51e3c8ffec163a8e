use crate::concurrency::{CancelToken, PrefixLock};
use crate::config::PipelineConfig;
use crate::lifecycle::{validate_transition, PipelineState, Stage};
use crate::{CoreError, PipelineError};
use brewline_fetch::{select_fetcher, Fetcher};
use brewline_runtime::{Builder, CommandRunner, SmokeContext, SmokeOutcome, SmokeTester, SystemRunner};
use brewline_schema::{parse_manifest_file, Manifest};
use brewline_store::{verify_file, Installer, PrefixLayout};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

type StageObserver = Arc<dyn Fn(Stage) + Send + Sync>;

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub name: String,
    pub version: Option<String>,
    /// Every state visited, `Parsed` through `Succeeded`.
    pub states: Vec<PipelineState>,
    /// Verified digest of the fetched archive.
    pub digest: String,
    pub artifacts: Vec<String>,
    pub installed: Vec<PathBuf>,
    pub receipt: PathBuf,
    /// Smoke test output; `None` when the manifest has no smoke test.
    pub smoke_output: Option<String>,
}

/// Runs the install stages for one manifest in order, stopping at the first
/// failure.
///
/// Each run gets its own scratch directory, so independent pipelines may run
/// side by side. Installs into a shared prefix serialize on the prefix lock.
pub struct Pipeline {
    config: PipelineConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    cancel: CancelToken,
    on_stage: Option<StageObserver>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            runner: None,
            fetcher: None,
            cancel: CancelToken::new(),
            on_stage: None,
        }
    }

    /// Replace the system process runner, e.g. with a mock.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Use `fetcher` for every URL instead of choosing by scheme.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called as each stage starts.
    #[must_use]
    pub fn on_stage(mut self, observer: impl Fn(Stage) + Send + Sync + 'static) -> Self {
        self.on_stage = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Parse the manifest at `manifest_path` and run every stage.
    pub fn run(&self, manifest_path: &Path) -> Result<PipelineReport, PipelineError> {
        info!("installing from {}", manifest_path.display());
        self.begin(Stage::Parse)?;
        let manifest =
            parse_manifest_file(manifest_path).map_err(|e| PipelineError::new(Stage::Parse, e.into()))?;
        self.run_manifest(&manifest)
    }

    /// Run the stages after parsing for an already validated manifest.
    #[allow(clippy::too_many_lines)]
    pub fn run_manifest(&self, manifest: &Manifest) -> Result<PipelineReport, PipelineError> {
        let mut states = vec![PipelineState::Parsed];
        let runner = self.runner();

        // Fetch
        self.begin(Stage::Fetch)?;
        let work_root = self.config.resolved_work_dir();
        let work = stage(Stage::Fetch, || {
            std::fs::create_dir_all(&work_root)?;
            Ok(tempfile::Builder::new()
                .prefix("brewline-run-")
                .tempdir_in(&work_root)?)
        })?;
        debug!("work dir: {}", work.path().display());
        let fetched = stage(Stage::Fetch, || {
            let selected;
            let fetcher: &dyn Fetcher = match &self.fetcher {
                Some(f) => f.as_ref(),
                None => {
                    selected = select_fetcher(&manifest.source_url, &self.config.fetch_options())?;
                    selected.as_ref()
                }
            };
            debug!("fetching {} with {} fetcher", manifest.source_url, fetcher.name());
            Ok(fetcher.fetch(&manifest.source_url, work.path())?)
        })?;
        info!("fetched {} ({} bytes)", manifest.source_url, fetched.size());
        advance(&mut states, Stage::Fetch)?;

        // Verify
        self.begin(Stage::Verify)?;
        let digest = stage(Stage::Verify, || Ok(verify_file(fetched.path(), &manifest.checksum)?))?;
        info!("verified {} digest {digest}", manifest.checksum.algorithm());
        advance(&mut states, Stage::Verify)?;

        // Build
        self.begin(Stage::Build)?;
        let builder = Builder::new(Arc::clone(&runner), self.config.build_options());
        let build = stage(Stage::Build, || {
            Ok(builder.build(manifest, fetched.path(), work.path())?)
        })?;
        advance(&mut states, Stage::Build)?;

        // Install
        self.begin(Stage::Install)?;
        let prefix = stage(Stage::Install, || self.config.resolved_prefix())?;
        let layout = PrefixLayout::new(&prefix);
        let installed = stage(Stage::Install, || {
            let _lock = PrefixLock::acquire(&layout.lock_file())?;
            Ok(Installer::new(layout.clone()).install(manifest, &build.artifacts)?)
        })?;
        advance(&mut states, Stage::Install)?;

        // Smoke test
        self.begin(Stage::SmokeTest)?;
        let ctx = SmokeContext {
            bin: layout.bin_dir(),
            prefix: layout.root().to_path_buf(),
            name: manifest.name.to_string(),
            version: manifest.resolved_version(),
        };
        let tester = SmokeTester::new(runner, self.config.smoke_timeout());
        let outcome = stage(Stage::SmokeTest, || Ok(tester.run(manifest, &ctx)?))?;
        advance(&mut states, Stage::SmokeTest)?;
        transition(&mut states, PipelineState::Succeeded, Stage::SmokeTest)?;

        info!("{} installed into {}", manifest.name, prefix.display());
        Ok(PipelineReport {
            name: manifest.name.to_string(),
            version: manifest.resolved_version(),
            states,
            digest,
            artifacts: build.artifacts.keys().map(ToString::to_string).collect(),
            installed: installed.paths(),
            receipt: installed.receipt,
            smoke_output: match outcome {
                SmokeOutcome::Skipped => None,
                SmokeOutcome::Passed { output, .. } => Some(output),
            },
        })
    }

    fn runner(&self) -> Arc<dyn CommandRunner> {
        match &self.runner {
            Some(r) => Arc::clone(r),
            None => Arc::new(SystemRunner::new().with_cancel_flag(self.cancel.flag())),
        }
    }

    /// Check for cancellation before `next` starts.
    fn begin(&self, next: Stage) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            info!("cancelled before {next}");
            return Err(PipelineError::new(next, CoreError::Cancelled));
        }
        debug!("stage: {next}");
        if let Some(observer) = &self.on_stage {
            observer(next);
        }
        Ok(())
    }
}

fn stage<T>(stage: Stage, f: impl FnOnce() -> Result<T, CoreError>) -> Result<T, PipelineError> {
    f().map_err(|e| PipelineError::new(stage, e))
}

fn advance(states: &mut Vec<PipelineState>, completed: Stage) -> Result<(), PipelineError> {
    transition(states, completed.completes(), completed)
}

fn transition(
    states: &mut Vec<PipelineState>,
    to: PipelineState,
    during: Stage,
) -> Result<(), PipelineError> {
    if let Some(&from) = states.last() {
        validate_transition(from, to).map_err(|e| PipelineError::new(during, e))?;
    }
    states.push(to);
    Ok(())
}
