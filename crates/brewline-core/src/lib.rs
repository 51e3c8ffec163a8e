//! Install pipeline orchestration for brewline.
//!
//! This crate ties together manifest parsing, fetching, verification,
//! building, installation and smoke testing into the `Pipeline`, the central
//! API behind `brewline install`. It also provides the pipeline state
//! machine, the error taxonomy the CLI maps to exit codes, configuration
//! loading, prefix locking and cooperative cancellation.

pub mod concurrency;
pub mod config;
pub mod lifecycle;
pub mod pipeline;

pub use concurrency::{install_signal_handler, CancelToken, PrefixLock};
pub use config::PipelineConfig;
pub use lifecycle::{validate_transition, ErrorKind, PipelineState, Stage};
pub use pipeline::{Pipeline, PipelineReport};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] brewline_schema::ManifestError),
    #[error("fetch error: {0}")]
    Fetch(#[from] brewline_fetch::FetchError),
    #[error("store error: {0}")]
    Store(#[from] brewline_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] brewline_runtime::RuntimeError),
    #[error("cannot lock {}: {source}", path.display())]
    Lock {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A failed pipeline run: which stage failed, how, and the detailed cause.
#[derive(Debug, Error)]
#[error("{stage} failed ({kind}): {source}")]
pub struct PipelineError {
    pub stage: Stage,
    pub kind: ErrorKind,
    #[source]
    pub source: CoreError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: CoreError) -> Self {
        Self {
            stage,
            kind: ErrorKind::classify(stage, &source),
            source,
        }
    }

    /// The terminal state this failure puts the pipeline in.
    pub fn state(&self) -> PipelineState {
        PipelineState::Failed {
            stage: self.stage,
            kind: self.kind,
        }
    }

    /// Process exit code for this failure: one per stage, 130 when cancelled.
    pub fn exit_code(&self) -> i32 {
        if self.kind == ErrorKind::Cancelled {
            return 130;
        }
        self.stage.exit_code()
    }
}
