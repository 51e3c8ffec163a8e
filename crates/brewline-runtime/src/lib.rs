//! Build and smoke-test execution for brewline packages.
//!
//! This crate implements the execution layer: the mockable `CommandRunner`
//! trait with a `SystemRunner` that enforces timeouts, build dependency
//! preflight, the `Builder` that extracts a verified archive, runs the
//! manifest's build command and enumerates produced artifacts, and the
//! `SmokeTester` that runs an installed binary and checks its output.

pub mod build;
pub mod mock;
pub mod prereq;
pub mod process;
pub mod smoke;

pub use build::{BuildOptions, BuildOutput, Builder};
pub use mock::{MockResponse, MockRunner};
pub use prereq::{
    check_build_dependencies, check_build_dependencies_in, format_missing, MissingDependency,
};
pub use process::{CommandRunner, CommandSpec, ProcessOutput, SystemRunner};
pub use smoke::{SmokeContext, SmokeOutcome, SmokeTester};

use brewline_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("{}", format_missing(.0))]
    MissingDependencies(Vec<MissingDependency>),
    #[error("source extraction failed: {0}")]
    Extract(#[from] StoreError),
    #[error("build command exited with code {exit_code}\n{output}")]
    BuildFailed { exit_code: i32, output: String },
    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("`{0}` interrupted by cancellation")]
    Cancelled(String),
    #[error("smoke test failed: expected {expected}, got: {actual}")]
    SmokeTestFailed { expected: String, actual: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failed_display_includes_code_and_output() {
        let e = RuntimeError::BuildFailed {
            exit_code: 101,
            output: "error[E0425]: cannot find value".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("101"));
        assert!(msg.contains("E0425"));
    }

    #[test]
    fn missing_dependencies_display_lists_each() {
        let e = RuntimeError::MissingDependencies(vec![
            MissingDependency::new("rust"),
            MissingDependency::new("cmake"),
        ]);
        let msg = e.to_string();
        assert!(msg.contains("cargo"));
        assert!(msg.contains("cmake"));
    }
}
