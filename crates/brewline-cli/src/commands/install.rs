use super::{colorize_state, json_pretty, spin_fail, spin_ok, spinner, stage_message, EXIT_FAILURE, EXIT_SUCCESS};
use brewline_core::{
    CancelToken, CoreError, Pipeline, PipelineConfig, PipelineError, PipelineReport, Stage,
};
use brewline_store::StoreError;
use std::path::{Path, PathBuf};

pub fn run(
    config: PipelineConfig,
    manifest: &Path,
    cancel: &CancelToken,
    json: bool,
) -> Result<u8, String> {
    let pb = if json {
        None
    } else {
        Some(spinner(stage_message(Stage::Parse)))
    };

    tracing::debug!(manifest = %manifest.display(), "starting install");
    let mut pipeline = Pipeline::new(config).with_cancel_token(cancel.clone());
    if let Some(pb) = &pb {
        let pb = pb.clone();
        pipeline = pipeline.on_stage(move |stage| pb.set_message(stage_message(stage)));
    }

    match pipeline.run(manifest) {
        Ok(report) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &installed_summary(&report));
            }
            if json {
                let payload = serde_json::json!({
                    "status": "succeeded",
                    "report": report,
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                print_report(&report);
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{} failed", e.stage));
            }
            if json {
                println!("{}", json_pretty(&failure_json(&e))?);
            } else {
                eprintln!("error: {} failed ({}): {}", e.stage, e.kind, e.source);
                let partial = partial_install(&e);
                if !partial.is_empty() {
                    eprintln!("warning: partial install left these files in place:");
                    for p in partial {
                        eprintln!("  {}", p.display());
                    }
                }
                eprintln!("state: {}", colorize_state(&e.state().to_string()));
            }
            Ok(u8::try_from(e.exit_code()).unwrap_or(EXIT_FAILURE))
        }
    }
}

fn installed_summary(report: &PipelineReport) -> String {
    match &report.version {
        Some(v) => format!("installed {} {v}", report.name),
        None => format!("installed {}", report.name),
    }
}

fn print_report(report: &PipelineReport) {
    println!("digest: {}", report.digest);
    for path in &report.installed {
        println!("  {}", path.display());
    }
    match &report.smoke_output {
        Some(out) => println!("smoke test: {}", out.lines().next().unwrap_or("").trim()),
        None => println!("smoke test: skipped"),
    }
    if let Some(last) = report.states.last() {
        println!("state: {}", colorize_state(&last.to_string()));
    }
}

fn partial_install(e: &PipelineError) -> &[PathBuf] {
    match &e.source {
        CoreError::Store(StoreError::MissingArtifact { installed, .. }) => installed,
        _ => &[],
    }
}

fn failure_json(e: &PipelineError) -> serde_json::Value {
    serde_json::json!({
        "status": "failed",
        "stage": e.stage,
        "kind": e.kind,
        "exit_code": e.exit_code(),
        "error": e.source.to_string(),
        "partial_install": partial_install(e),
    })
}
