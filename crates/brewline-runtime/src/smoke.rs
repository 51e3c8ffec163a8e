use crate::process::{CommandRunner, CommandSpec};
use crate::RuntimeError;
use brewline_schema::{Manifest, OutputMatcher, SmokeTest};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const ACTUAL_TAIL_LINES: usize = 20;

/// Values substituted for `{bin}`, `{prefix}`, `{name}` and `{version}`.
#[derive(Debug, Clone)]
pub struct SmokeContext {
    pub bin: PathBuf,
    pub prefix: PathBuf,
    pub name: String,
    pub version: Option<String>,
}

impl SmokeContext {
    /// An unknown version leaves `{version}` in place, so an expectation
    /// that mentions it fails instead of trivially matching.
    pub fn substitute(&self, input: &str) -> String {
        let mut out = input
            .replace("{bin}", &self.bin.to_string_lossy())
            .replace("{prefix}", &self.prefix.to_string_lossy())
            .replace("{name}", &self.name);
        if let Some(version) = &self.version {
            out = out.replace("{version}", version);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmokeOutcome {
    /// The manifest declares no smoke test.
    Skipped,
    /// Every declared test passed; `output` joins their outputs in order.
    Passed { commands: Vec<String>, output: String },
}

pub struct SmokeTester {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl SmokeTester {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Runs each declared test in order and stops at the first failure.
    pub fn run(&self, manifest: &Manifest, ctx: &SmokeContext) -> Result<SmokeOutcome, RuntimeError> {
        if manifest.smoke_tests.is_empty() {
            warn!("{} has no smoke test; skipping", manifest.name);
            return Ok(SmokeOutcome::Skipped);
        }

        let mut commands = Vec::with_capacity(manifest.smoke_tests.len());
        let mut outputs = Vec::with_capacity(manifest.smoke_tests.len());
        for test in &manifest.smoke_tests {
            let (command, output) = self.run_one(test, ctx)?;
            commands.push(command);
            outputs.push(output);
        }
        Ok(SmokeOutcome::Passed {
            commands,
            output: outputs.join("\n"),
        })
    }

    fn run_one(&self, test: &SmokeTest, ctx: &SmokeContext) -> Result<(String, String), RuntimeError> {
        let tokens: Vec<String> = test.command.iter().map(|t| ctx.substitute(t)).collect();
        let command = CommandSpec::from_tokens(&tokens)
            .ok_or_else(|| RuntimeError::InvalidCommand("empty smoke test command".to_owned()))?;
        let output = self.runner.run(&command, &ctx.prefix, self.timeout)?;
        let combined = output.combined();

        let expected = match &test.matcher {
            OutputMatcher::Contains(s) => format!("`{command}` output containing '{}'", ctx.substitute(s)),
            OutputMatcher::Pattern(p) => format!("`{command}` output matching /{p}/"),
        };

        if !output.success() {
            let code = output
                .exit_code
                .map_or_else(|| "signal".to_owned(), |c| c.to_string());
            return Err(RuntimeError::SmokeTestFailed {
                expected: format!("exit code 0 and {expected}"),
                actual: format!("exit code {code}: {}", output.tail(ACTUAL_TAIL_LINES)),
            });
        }

        let matched = match &test.matcher {
            OutputMatcher::Contains(s) => combined.contains(&ctx.substitute(s)),
            OutputMatcher::Pattern(p) => Regex::new(p)
                .map_err(|e| RuntimeError::InvalidCommand(format!("smoke test pattern: {e}")))?
                .is_match(&combined),
        };
        if !matched {
            return Err(RuntimeError::SmokeTestFailed {
                expected,
                actual: output.tail(ACTUAL_TAIL_LINES),
            });
        }

        info!("smoke test passed: `{command}`");
        Ok((command.to_string(), combined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockResponse, MockRunner};
    use brewline_schema::parse_manifest_str;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn manifest(smoke: &str) -> Manifest {
        parse_manifest_str(&format!(
            r#"
name = "zetamac"
version = "0.5.1"
source_url = "https://example.com/0.5.1.tar.gz"
checksum = "{HELLO_SHA256}"
license = "MIT"
build_command = ["cargo", "build", "--release"]
{smoke}
"#
        ))
        .unwrap()
    }

    fn ctx() -> SmokeContext {
        SmokeContext {
            bin: PathBuf::from("/opt/p/bin"),
            prefix: PathBuf::from("/opt/p"),
            name: "zetamac".to_owned(),
            version: Some("0.5.1".to_owned()),
        }
    }

    fn tester(runner: MockRunner) -> (Arc<MockRunner>, SmokeTester) {
        let runner = Arc::new(runner);
        let t = SmokeTester::new(runner.clone(), Duration::from_secs(5));
        (runner, t)
    }

    const VERSION_TEST: &str = r#"
[smoke_test]
command = ["{bin}/zetamac", "--version"]
expect = "{version}"
"#;

    #[test]
    fn substitutes_variables() {
        let c = ctx();
        assert_eq!(c.substitute("{bin}/zetamac"), "/opt/p/bin/zetamac");
        assert_eq!(c.substitute("{name} {version} {prefix}"), "zetamac 0.5.1 /opt/p");
        let unknown = SmokeContext { version: None, ..ctx() };
        assert_eq!(unknown.substitute("{version}"), "{version}");
    }

    #[test]
    fn passes_when_output_contains_version() {
        let (runner, t) = tester(MockRunner::new().respond(MockResponse::success().stdout("zetamac 0.5.1\n")));
        let outcome = t.run(&manifest(VERSION_TEST), &ctx()).unwrap();
        assert!(matches!(outcome, SmokeOutcome::Passed { .. }));
        assert_eq!(runner.calls()[0].0.program, "/opt/p/bin/zetamac");
        assert_eq!(runner.calls()[0].0.args, vec!["--version"]);
    }

    #[test]
    fn wrong_version_fails_with_expected_and_actual() {
        let (_r, t) = tester(MockRunner::new().respond(MockResponse::success().stdout("zetamac 0.4.0\n")));
        match t.run(&manifest(VERSION_TEST), &ctx()).unwrap_err() {
            RuntimeError::SmokeTestFailed { expected, actual } => {
                assert!(expected.contains("0.5.1"));
                assert!(actual.contains("0.4.0"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn non_zero_exit_fails_even_when_output_matches() {
        let (_r, t) = tester(MockRunner::new().respond(MockResponse {
            exit_code: 1,
            stdout: "zetamac 0.5.1".to_owned(),
            ..MockResponse::default()
        }));
        let err = t.run(&manifest(VERSION_TEST), &ctx()).unwrap_err();
        assert!(matches!(err, RuntimeError::SmokeTestFailed { ref actual, .. } if actual.contains("exit code 1")));
    }

    #[test]
    fn stderr_output_is_matched() {
        let (_r, t) = tester(MockRunner::new().respond(MockResponse {
            stderr: "zetamac 0.5.1\n".to_owned(),
            ..MockResponse::default()
        }));
        assert!(t.run(&manifest(VERSION_TEST), &ctx()).is_ok());
    }

    #[test]
    fn pattern_matcher() {
        let m = manifest(
            r#"
[smoke_test]
command = ["{bin}/zetamac", "--help"]
pattern = "^Usage: zetamac"
"#,
        );
        let (_r, t) = tester(MockRunner::new().respond(MockResponse::success().stdout("Usage: zetamac [OPTIONS]")));
        assert!(t.run(&m, &ctx()).is_ok());
        let (_r, t) = tester(MockRunner::new().respond(MockResponse::success().stdout("usage?")));
        assert!(t.run(&m, &ctx()).is_err());
    }

    #[test]
    fn runs_every_test_and_stops_at_first_failure() {
        let m = manifest(
            r#"
[[smoke_test]]
command = ["{bin}/zetamac", "--version"]
expect = "{version}"

[[smoke_test]]
command = ["{bin}/zetamac", "--help"]
pattern = "^Usage"

[[smoke_test]]
command = ["{bin}/zetamac", "--never-reached"]
expect = "x"
"#,
        );
        let (runner, t) = tester(
            MockRunner::new()
                .respond(MockResponse::success().stdout("zetamac 0.5.1\n"))
                .respond(MockResponse::success().stdout("nope\n")),
        );
        match t.run(&m, &ctx()).unwrap_err() {
            RuntimeError::SmokeTestFailed { expected, actual } => {
                assert!(expected.contains("--help"));
                assert!(actual.contains("nope"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(runner.call_count(), 2);

        let (runner, t) = tester(
            MockRunner::new()
                .respond(MockResponse::success().stdout("zetamac 0.5.1\n"))
                .respond(MockResponse::success().stdout("Usage: zetamac\n"))
                .respond(MockResponse::success().stdout("x\n")),
        );
        match t.run(&m, &ctx()).unwrap() {
            SmokeOutcome::Passed { commands, output } => {
                assert_eq!(commands.len(), 3);
                assert!(output.contains("0.5.1") && output.contains("Usage: zetamac"));
            }
            SmokeOutcome::Skipped => panic!("expected smoke tests to run"),
        }
        assert_eq!(runner.call_count(), 3);
    }

    #[test]
    fn no_smoke_test_is_skipped() {
        let (runner, t) = tester(MockRunner::new());
        assert_eq!(t.run(&manifest(""), &ctx()).unwrap(), SmokeOutcome::Skipped);
        assert_eq!(runner.call_count(), 0);
    }
}
