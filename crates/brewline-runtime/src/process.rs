use crate::RuntimeError;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A program and its arguments, never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// First token is the program; `None` for an empty list or empty program.
    pub fn from_tokens(tokens: &[String]) -> Option<Self> {
        let (program, args) = tokens.split_first()?;
        if program.is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !self.stderr.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }

    /// The last `lines` lines of the combined output.
    pub fn tail(&self, lines: usize) -> String {
        let combined = self.combined();
        let all: Vec<&str> = combined.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Runs external commands. Mocked in tests so no real toolchain is needed.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        command: &CommandSpec,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, RuntimeError>;
}

/// Runs commands as child processes with stdin closed.
///
/// Output pipes are drained on background threads so a chatty build cannot
/// block on a full pipe while we wait on it. On Unix the child leads its own
/// process group, and the whole group is killed when the timeout expires or
/// the cancel flag is raised, including while waiting for the pipes to close.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner {
    cancel: Option<Arc<AtomicBool>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn interrupted(
        &self,
        command: &CommandSpec,
        deadline: Instant,
        timeout: Duration,
    ) -> Option<RuntimeError> {
        if self.cancelled() {
            return Some(RuntimeError::Cancelled(command.to_string()));
        }
        if Instant::now() >= deadline {
            warn!("killing `{command}` after {}s", timeout.as_secs());
            return Some(RuntimeError::Timeout {
                command: command.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        None
    }
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        command: &CommandSpec,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, RuntimeError> {
        debug!("running `{command}` in {}", cwd.display());
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so background jobs the command leaves behind die with it.
            cmd.process_group(0);
        }
        let mut child = cmd.spawn().map_err(|e| RuntimeError::Spawn {
            command: command.to_string(),
            source: e,
        })?;

        let (tx, rx) = mpsc::channel();
        let mut pending = 0;
        if let Some(pipe) = child.stdout.take() {
            drain(pipe, Stream::Stdout, tx.clone());
            pending += 1;
        }
        if let Some(pipe) = child.stderr.take() {
            drain(pipe, Stream::Stderr, tx.clone());
            pending += 1;
        }
        drop(tx);
        let deadline = Instant::now() + timeout;

        let status = loop {
            if let Some(err) = self.interrupted(command, deadline, timeout) {
                kill_group(&mut child);
                return Err(err);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(status) = child.wait_timeout(remaining.min(POLL_INTERVAL))? {
                break status;
            }
        };

        // A background process may still hold the pipes open after the
        // command itself exited; the deadline covers that wait too.
        let mut output = ProcessOutput {
            exit_code: status.code(),
            ..ProcessOutput::default()
        };
        while pending > 0 {
            if let Some(err) = self.interrupted(command, deadline, timeout) {
                kill_group(&mut child);
                return Err(err);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok((stream, bytes)) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    match stream {
                        Stream::Stdout => output.stdout = text,
                        Stream::Stderr => output.stderr = text,
                    }
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("`{command}` exited with {:?}", output.exit_code);
        Ok(output)
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn drain(mut pipe: impl Read + Send + 'static, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    });
}

/// Kill the child's whole process group, then reap the child.
#[cfg(unix)]
fn kill_group(child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(child.id()) {
        Ok(pid) => {
            if let Err(e) = kill(Pid::from_raw(-pid), Signal::SIGKILL) {
                if e != Errno::ESRCH {
                    warn!(pid, error = ?e, "SIGKILL to process group failed");
                }
            }
        }
        Err(_) => {
            let _ = child.kill();
        }
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    #[test]
    fn from_tokens_splits_program() {
        let tokens = vec!["cargo".to_owned(), "build".to_owned(), "--release".to_owned()];
        let spec = CommandSpec::from_tokens(&tokens).unwrap();
        assert_eq!(spec.program, "cargo");
        assert_eq!(spec.args, vec!["build", "--release"]);
        assert_eq!(spec.to_string(), "cargo build --release");
        assert!(CommandSpec::from_tokens(&[]).is_none());
        assert!(CommandSpec::from_tokens(&[String::new()]).is_none());
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner::new()
            .run(&sh("echo out; echo err >&2; exit 3"), dir.path(), Duration::from_secs(10))
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.combined(), "out\nerr\n");
    }

    #[test]
    fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), b"x").unwrap();
        let out = SystemRunner::new()
            .run(&sh("ls"), dir.path(), Duration::from_secs(10))
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("marker"));
    }

    #[test]
    fn large_output_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner::new()
            .run(
                &sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"),
                dir.path(),
                Duration::from_secs(30),
            )
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.lines().count(), 20000);
        assert_eq!(out.tail(1), "line-19999");
    }

    #[test]
    fn timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = SystemRunner::new()
            .run(&sh("sleep 30"), dir.path(), Duration::from_millis(300))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn background_job_holding_pipes_still_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = SystemRunner::new()
            .run(&sh("sleep 30 & echo built"), dir.path(), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { seconds: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn background_job_that_finishes_in_time_is_collected() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner::new()
            .run(
                &sh("(sleep 1; echo late) & echo built"),
                dir.path(),
                Duration::from_secs(20),
            )
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "built\nlate\n");
    }

    #[test]
    fn raised_cancel_flag_stops_process() {
        let dir = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let err = SystemRunner::new()
            .with_cancel_flag(flag)
            .run(&sh("sleep 30"), dir.path(), Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled(_)));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SystemRunner::new()
            .run(
                &CommandSpec::new("brewline-no-such-program", Vec::<String>::new()),
                dir.path(),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let out = ProcessOutput {
            exit_code: Some(1),
            stdout: "a\nb\nc\n".to_owned(),
            stderr: "d\n".to_owned(),
        };
        assert_eq!(out.tail(2), "c\nd");
        assert_eq!(out.tail(10), "a\nb\nc\nd");
    }
}
