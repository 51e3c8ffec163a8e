use super::{json_pretty, EXIT_SUCCESS};
use brewline_schema::DigestAlgorithm;
use brewline_store::hash_file;
use std::path::Path;

pub fn run(file: &Path, algorithm: DigestAlgorithm, json: bool) -> Result<u8, String> {
    let digest = hash_file(file, algorithm).map_err(|e| format!("{}: {e}", file.display()))?;
    if json {
        let payload = serde_json::json!({
            "file": file,
            "algorithm": algorithm,
            "digest": digest,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{digest}  {}", file.display());
    }
    Ok(EXIT_SUCCESS)
}
