use super::EXIT_SUCCESS;
use clap::CommandFactory;
use std::path::{Path, PathBuf};

fn write_page(cmd: clap::Command, dir: &Path, page: &str) -> Result<PathBuf, String> {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd)
        .render(&mut buf)
        .map_err(|e| format!("man page render failed for {page}: {e}"))?;
    let path = dir.join(format!("{page}.1"));
    std::fs::write(&path, &buf).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(path)
}

/// Write `brewline.1` plus one `brewline-<sub>.1` per subcommand.
pub fn generate<C: CommandFactory>(dir: &Path) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("failed to create dir: {e}"))?;
    let cmd = C::command();
    let mut written = vec![write_page(cmd.clone(), dir, "brewline")?];
    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        let page = format!("brewline-{}", sub.get_name());
        written.push(write_page(sub.clone(), dir, &page)?);
    }
    Ok(written)
}

pub fn run<C: CommandFactory>(dir: &Path) -> Result<u8, String> {
    let written = generate::<C>(dir)?;
    println!("{} man pages written to {}", written.len(), dir.display());
    Ok(EXIT_SUCCESS)
}
