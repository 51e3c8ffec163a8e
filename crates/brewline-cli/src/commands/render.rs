use super::{json_pretty, EXIT_SUCCESS};
use brewline_schema::{parse_manifest_str, render_template};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

pub fn run(
    template: &Path,
    vars: &[(String, String)],
    output: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let input = std::fs::read_to_string(template)
        .map_err(|e| format!("failed to read {}: {e}", template.display()))?;
    let values: BTreeMap<String, String> = vars.iter().cloned().collect();
    let rendered = render_template(&input, &values).map_err(|e| format!("template error: {e}"))?;
    let manifest = parse_manifest_str(&rendered)
        .map_err(|e| format!("manifest error: rendered template is not a valid manifest: {e}"))?;

    match output {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let mut tmp = tempfile::NamedTempFile::new_in(dir)
                .map_err(|e| format!("failed to create temp file in {}: {e}", dir.display()))?;
            tmp.write_all(rendered.as_bytes())
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            tmp.persist(path)
                .map_err(|e| format!("failed to write {}: {}", path.display(), e.error))?;
            if json {
                let payload = serde_json::json!({
                    "output": path,
                    "name": manifest.name,
                    "version": manifest.resolved_version(),
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                println!("rendered {} to {}", manifest.name, path.display());
            }
        }
        None => print!("{rendered}"),
    }
    Ok(EXIT_SUCCESS)
}
