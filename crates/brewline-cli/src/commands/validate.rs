use super::{json_pretty, EXIT_MANIFEST_ERROR, EXIT_SUCCESS};
use brewline_schema::parse_manifest_file;
use std::path::Path;

pub fn run(manifest: &Path, json: bool) -> Result<u8, String> {
    match parse_manifest_file(manifest) {
        Ok(m) => {
            if json {
                let payload = serde_json::json!({
                    "valid": true,
                    "name": m.name,
                    "version": m.resolved_version(),
                    "checksum_algorithm": m.checksum.algorithm(),
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                let version = m.resolved_version().unwrap_or_else(|| "unknown".to_owned());
                println!("{}: valid manifest for {} {version}", manifest.display(), m.name);
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) if json => {
            let issues: Vec<_> = e
                .issues()
                .iter()
                .map(|i| serde_json::json!({ "field": i.field, "problem": i.problem }))
                .collect();
            let payload = serde_json::json!({
                "valid": false,
                "error": e.to_string(),
                "issues": issues,
            });
            println!("{}", json_pretty(&payload)?);
            Ok(EXIT_MANIFEST_ERROR)
        }
        Err(e) if !e.issues().is_empty() => {
            eprintln!("error: {} is not a valid manifest:", manifest.display());
            for issue in e.issues() {
                eprintln!("  - {issue}");
            }
            Ok(EXIT_MANIFEST_ERROR)
        }
        Err(e) => Err(format!("manifest error: {e}")),
    }
}
