//! Source artifact fetching for brewline.
//!
//! A [`Fetcher`] downloads the archive named by a manifest's `source_url` into
//! a scoped temporary directory. The returned [`FetchedArtifact`] removes that
//! directory when dropped unless the caller promotes the file elsewhere.

pub mod config;
pub mod file;
pub mod http;

pub use config::FetchOptions;
pub use file::FileFetcher;
pub use http::HttpFetcher;

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("timed out after {seconds}s fetching {url}")]
    Timeout { url: String, seconds: u64 },
    #[error("source not found: {0}")]
    NotFound(String),
}

/// A downloaded source archive living in its own temporary directory.
#[derive(Debug)]
pub struct FetchedArtifact {
    dir: TempDir,
    path: PathBuf,
    size: u64,
}

impl FetchedArtifact {
    /// Reserve a scoped directory inside `work_dir` and the file path the
    /// download should be written to.
    pub(crate) fn reserve(work_dir: &Path, file_name: &str) -> Result<(TempDir, PathBuf), FetchError> {
        fs::create_dir_all(work_dir)?;
        let dir = tempfile::Builder::new()
            .prefix("brewline-fetch-")
            .tempdir_in(work_dir)?;
        let path = dir.path().join(file_name);
        Ok((dir, path))
    }

    pub(crate) fn new(dir: TempDir, path: PathBuf, size: u64) -> Self {
        Self { dir, path, size }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Move the file out of the temporary directory so it survives drop.
    pub fn promote(self, dest: &Path) -> Result<PathBuf, FetchError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::rename(&self.path, dest).is_err() {
            // Cross-device moves fall back to copy; the temp dir still goes away.
            fs::copy(&self.path, dest)?;
        }
        tracing::debug!("promoted {} to {}", self.path.display(), dest.display());
        drop(self.dir);
        Ok(dest.to_path_buf())
    }
}

/// Downloads a source archive into a scoped location under `work_dir`.
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(&self, url: &str, work_dir: &Path) -> Result<FetchedArtifact, FetchError>;
}

/// Pick the fetcher for a URL's scheme.
pub fn select_fetcher(url: &str, options: &FetchOptions) -> Result<Box<dyn Fetcher>, FetchError> {
    let parsed = parse_url(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(Box::new(HttpFetcher::new(options.clone()))),
        "file" => Ok(Box::new(FileFetcher::new())),
        other => Err(FetchError::UnsupportedScheme(other.to_owned())),
    }
}

pub(crate) fn parse_url(url: &str) -> Result<url::Url, FetchError> {
    url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

/// File name for the downloaded archive: the URL's last path segment.
pub(crate) fn archive_file_name(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map_or_else(|| "source".to_owned(), str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_by_scheme() {
        let options = FetchOptions::default();
        assert_eq!(
            select_fetcher("https://example.com/a.tar.gz", &options)
                .unwrap()
                .name(),
            "http"
        );
        assert_eq!(
            select_fetcher("file:///tmp/a.tar.gz", &options).unwrap().name(),
            "file"
        );
        assert!(matches!(
            select_fetcher("ftp://example.com/a.tar.gz", &options),
            Err(FetchError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            select_fetcher("nope", &options),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn archive_name_from_last_segment() {
        let url = url::Url::parse("https://example.com/archive/refs/tags/0.5.1.tar.gz").unwrap();
        assert_eq!(archive_file_name(&url), "0.5.1.tar.gz");
        let bare = url::Url::parse("https://example.com/").unwrap();
        assert_eq!(archive_file_name(&bare), "source");
    }

    #[test]
    fn temp_dir_removed_on_drop() {
        let work = tempfile::tempdir().unwrap();
        let (dir, path) = FetchedArtifact::reserve(work.path(), "a.bin").unwrap();
        fs::write(&path, b"data").unwrap();
        let artifact = FetchedArtifact::new(dir, path.clone(), 4);
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn promote_keeps_file_and_removes_temp_dir() {
        let work = tempfile::tempdir().unwrap();
        let (dir, path) = FetchedArtifact::reserve(work.path(), "a.bin").unwrap();
        fs::write(&path, b"data").unwrap();
        let artifact = FetchedArtifact::new(dir, path, 4);

        let dest = work.path().join("kept").join("a.bin");
        let kept = artifact.promote(&dest).unwrap();
        assert_eq!(fs::read(&kept).unwrap(), b"data");
        let leftovers: Vec<_> = fs::read_dir(work.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name() != "kept")
            .collect();
        assert!(leftovers.is_empty());
    }
}
