use crate::process::{CommandRunner, CommandSpec, ProcessOutput};
use crate::RuntimeError;
use std::collections::VecDeque;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted result of one [`MockRunner`] call.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Executable files created relative to the working directory, the way
    /// a real build leaves binaries under `target/release`.
    pub creates: Vec<String>,
}

impl MockResponse {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: stderr.to_owned(),
            ..Self::default()
        }
    }

    pub fn stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_owned();
        self
    }

    pub fn creating(mut self, relative: &str) -> Self {
        self.creates.push(relative.to_owned());
        self
    }
}

/// Command runner that records calls and replays scripted responses in
/// order. Once the script is exhausted every call succeeds with no output.
#[derive(Default)]
pub struct MockRunner {
    script: Mutex<VecDeque<MockResponse>>,
    calls: Mutex<Vec<(CommandSpec, PathBuf)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: MockResponse) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<(CommandSpec, PathBuf)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for MockRunner {
    fn run(
        &self,
        command: &CommandSpec,
        cwd: &Path,
        _timeout: Duration,
    ) -> Result<ProcessOutput, RuntimeError> {
        self.calls
            .lock()
            .map_err(|e| RuntimeError::InvalidCommand(format!("mutex poisoned: {e}")))?
            .push((command.clone(), cwd.to_path_buf()));

        let response = self
            .script
            .lock()
            .map_err(|e| RuntimeError::InvalidCommand(format!("mutex poisoned: {e}")))?
            .pop_front()
            .unwrap_or_default();

        for relative in &response.creates {
            let path = cwd.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, format!("#!/bin/sh\necho mock {relative}\n"))?;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }

        Ok(ProcessOutput {
            exit_code: Some(response.exit_code),
            stdout: response.stdout,
            stderr: response.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_defaults_to_success() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new()
            .respond(MockResponse::failure(2, "boom"))
            .respond(MockResponse::success().stdout("ok"));
        let cmd = CommandSpec::new("cargo", ["build"]);
        let t = Duration::from_secs(1);

        let first = runner.run(&cmd, dir.path(), t).unwrap();
        assert_eq!(first.exit_code, Some(2));
        assert_eq!(first.stderr, "boom");
        assert_eq!(runner.run(&cmd, dir.path(), t).unwrap().stdout, "ok");
        assert!(runner.run(&cmd, dir.path(), t).unwrap().success());
        assert_eq!(runner.call_count(), 3);
        assert_eq!(runner.calls()[0].0, cmd);
    }

    #[test]
    fn creates_executables_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            MockRunner::new().respond(MockResponse::success().creating("target/release/zetamac-rs"));
        runner
            .run(&CommandSpec::new("cargo", ["build"]), dir.path(), Duration::from_secs(1))
            .unwrap();
        let path = dir.path().join("target/release/zetamac-rs");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
