pub mod checksum;
pub mod completions;
pub mod install;
pub mod list;
pub mod man_pages;
pub mod render;
pub mod uninstall;
pub mod validate;

use brewline_core::{PipelineConfig, Stage};
use brewline_store::PrefixLayout;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Parse => "parsing manifest...",
        Stage::Fetch => "fetching source...",
        Stage::Verify => "verifying checksum...",
        Stage::Build => "building...",
        Stage::Install => "installing...",
        Stage::SmokeTest => "running smoke test...",
    }
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    if state.starts_with("failed") {
        return Style::new().red().bold().apply_to(state).to_string();
    }
    match state {
        "succeeded" => Style::new().green().bold().apply_to(state).to_string(),
        "installed" | "tested" => Style::new().green().apply_to(state).to_string(),
        "parsed" | "fetched" | "verified" | "built" => {
            Style::new().dim().apply_to(state).to_string()
        }
        other => other.to_owned(),
    }
}

pub fn prefix_layout(config: &PipelineConfig) -> Result<PrefixLayout, String> {
    config
        .resolved_prefix()
        .map(PrefixLayout::new)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_string() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_state_succeeded() {
        assert!(colorize_state("succeeded").contains("succeeded"));
    }

    #[test]
    fn colorize_state_failed() {
        let s = colorize_state("failed(build, BuildError)");
        assert!(s.contains("failed(build, BuildError)"));
    }

    #[test]
    fn colorize_state_unknown() {
        assert_eq!(colorize_state("unknown"), "unknown");
    }

    #[test]
    fn every_stage_has_a_message() {
        for stage in [
            Stage::Parse,
            Stage::Fetch,
            Stage::Verify,
            Stage::Build,
            Stage::Install,
            Stage::SmokeTest,
        ] {
            assert!(stage_message(stage).ends_with("..."));
        }
    }

    #[test]
    fn prefix_layout_uses_configured_prefix() {
        let config = PipelineConfig::default().with_prefix("/opt/tools");
        let layout = prefix_layout(&config).unwrap();
        assert_eq!(layout.bin_dir(), std::path::PathBuf::from("/opt/tools/bin"));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_MANIFEST_ERROR);
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
    }

    #[test]
    fn spinner_fail_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
