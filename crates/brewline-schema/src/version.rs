use regex::Regex;
use std::sync::LazyLock;

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[vV]?(\d+(?:\.\d+)*(?:[-+][0-9A-Za-z.]+)?)$").expect("valid version regex")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[vV]?(\d+(?:\.\d+)+)$").expect("valid tag regex"));

const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar.xz", ".tar.bz2", ".tar", ".zip"];

/// Infer a package version from a source URL.
///
/// Tries the archive file stem (`0.5.1.tar.gz`, `v1.2.tar.gz`,
/// `tool-1.2.3.tar.gz`), then any tag-like path segment
/// (`/releases/download/v0.1.0/tool.tar.gz`).
pub fn infer_version(source_url: &str) -> Option<String> {
    let url = url::Url::parse(source_url).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let last = segments.last()?;

    let stem = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| last.strip_suffix(ext))
        .unwrap_or(last);

    if let Some(caps) = VERSION.captures(stem) {
        return Some(caps[1].to_owned());
    }
    if let Some((_, tail)) = stem.rsplit_once('-') {
        if let Some(caps) = VERSION.captures(tail) {
            return Some(caps[1].to_owned());
        }
    }

    segments
        .iter()
        .rev()
        .skip(1)
        .find_map(|seg| TAG.captures(seg).map(|c| c[1].to_owned()))
}
