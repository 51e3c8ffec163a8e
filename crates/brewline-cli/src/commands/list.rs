use super::{json_pretty, prefix_layout, EXIT_SUCCESS};
use brewline_core::PipelineConfig;
use brewline_store::ReceiptStore;

pub fn run(config: &PipelineConfig, json: bool) -> Result<u8, String> {
    let layout = prefix_layout(config)?;
    let receipts = ReceiptStore::new(layout.clone())
        .list()
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&receipts)?);
    } else if receipts.is_empty() {
        println!("nothing installed in {}", layout.root().display());
    } else {
        println!("{:<20} {:<12} {:<6} INSTALLED_AT", "NAME", "VERSION", "FILES");
        for r in &receipts {
            let name = console::Style::new().bold().apply_to(&r.name).to_string();
            println!(
                "{:<20} {:<12} {:<6} {}",
                name,
                r.version.as_deref().unwrap_or("-"),
                r.installed_files.len(),
                r.installed_at
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
