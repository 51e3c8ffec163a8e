use super::{json_pretty, prefix_layout, EXIT_SUCCESS};
use brewline_core::{PipelineConfig, PrefixLock};
use brewline_store::Installer;

pub fn run(config: &PipelineConfig, name: &str, json: bool) -> Result<u8, String> {
    let layout = prefix_layout(config)?;
    let _lock = PrefixLock::acquire(&layout.lock_file()).map_err(|e| format!("prefix lock: {e}"))?;
    let removed = Installer::new(layout)
        .uninstall(name)
        .map_err(|e| e.to_string())?;
    if json {
        let payload = serde_json::json!({
            "name": name,
            "removed": removed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for path in &removed {
            println!("removed {}", path.display());
        }
        println!("uninstalled {name}");
    }
    Ok(EXIT_SUCCESS)
}
