use crate::CoreError;
use brewline_runtime::RuntimeError;
use brewline_store::StoreError;
use serde::Serialize;
use std::fmt;

/// One sequential phase of the install pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Fetch,
    Verify,
    Build,
    Install,
    SmokeTest,
}

impl Stage {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Parse => 2,
            Self::Fetch => 3,
            Self::Verify => 4,
            Self::Build => 5,
            Self::Install => 6,
            Self::SmokeTest => 7,
        }
    }

    /// The state a successful run of this stage leads to.
    pub fn completes(self) -> PipelineState {
        match self {
            Self::Parse => PipelineState::Parsed,
            Self::Fetch => PipelineState::Fetched,
            Self::Verify => PipelineState::Verified,
            Self::Build => PipelineState::Built,
            Self::Install => PipelineState::Installed,
            Self::SmokeTest => PipelineState::Tested,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Build => "build",
            Self::Install => "install",
            Self::SmokeTest => "smoke test",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidManifest,
    FetchError,
    ChecksumMismatch,
    BuildError,
    InstallError,
    SmokeTestFailure,
    Cancelled,
    Io,
}

impl ErrorKind {
    /// Kind of a failure raised while `stage` was running.
    pub fn classify(stage: Stage, error: &CoreError) -> Self {
        match error {
            CoreError::Cancelled | CoreError::Runtime(RuntimeError::Cancelled(_)) => {
                return Self::Cancelled
            }
            CoreError::Io(_) => return Self::Io,
            _ => {}
        }
        match stage {
            Stage::Parse => Self::InvalidManifest,
            Stage::Fetch => Self::FetchError,
            Stage::Verify => match error {
                CoreError::Store(StoreError::ChecksumMismatch { .. }) => Self::ChecksumMismatch,
                _ => Self::Io,
            },
            Stage::Build => Self::BuildError,
            Stage::Install => Self::InstallError,
            Stage::SmokeTest => Self::SmokeTestFailure,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PipelineState {
    Parsed,
    Fetched,
    Verified,
    Built,
    Installed,
    Tested,
    Succeeded,
    Failed { stage: Stage, kind: ErrorKind },
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => f.write_str("parsed"),
            Self::Fetched => f.write_str("fetched"),
            Self::Verified => f.write_str("verified"),
            Self::Built => f.write_str("built"),
            Self::Installed => f.write_str("installed"),
            Self::Tested => f.write_str("tested"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed { stage, kind } => write!(f, "failed({stage}, {kind})"),
        }
    }
}

pub fn validate_transition(from: PipelineState, to: PipelineState) -> Result<(), CoreError> {
    use PipelineState::{Built, Failed, Fetched, Installed, Parsed, Succeeded, Tested, Verified};

    let valid = matches!(
        (from, to),
        (Parsed, Fetched)
            | (Fetched, Verified)
            | (Verified, Built)
            | (Built, Installed)
            | (Installed, Tested)
            | (Tested, Succeeded)
    ) || (!from.is_terminal() && matches!(to, Failed { .. }));

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
