use crate::{archive_file_name, parse_url, FetchError, FetchedArtifact, Fetcher};
use std::fs;
use std::path::Path;

/// Fetcher for `file://` URLs: copies a local archive into the scoped
/// download directory so later stages treat it like any other download.
#[derive(Debug, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl Fetcher for FileFetcher {
    fn name(&self) -> &'static str {
        "file"
    }

    fn fetch(&self, url: &str, work_dir: &Path) -> Result<FetchedArtifact, FetchError> {
        let parsed = parse_url(url)?;
        if parsed.scheme() != "file" {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_owned()));
        }
        let source = parsed.to_file_path().map_err(|()| FetchError::InvalidUrl {
            url: url.to_owned(),
            reason: "not a local file path".to_owned(),
        })?;
        if !source.is_file() {
            return Err(FetchError::NotFound(source.display().to_string()));
        }

        let (dir, dest) = FetchedArtifact::reserve(work_dir, &archive_file_name(&parsed))?;
        tracing::debug!("copy {} -> {}", source.display(), dest.display());
        let size = fs::copy(&source, &dest)?;
        Ok(FetchedArtifact::new(dir, dest, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_url(path: &Path) -> String {
        url::Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn copies_local_file() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let archive = src.path().join("tool-1.0.tar.gz");
        fs::write(&archive, b"hello").unwrap();

        let fetched = FileFetcher::new()
            .fetch(&file_url(&archive), work.path())
            .unwrap();
        assert_eq!(fetched.size(), 5);
        assert_eq!(fs::read(fetched.path()).unwrap(), b"hello");
        assert!(fetched.path().ends_with("tool-1.0.tar.gz"));
        assert!(fetched.path().starts_with(work.path()));
    }

    #[test]
    fn missing_file_is_not_found() {
        let work = tempfile::tempdir().unwrap();
        let err = FileFetcher::new()
            .fetch("file:///definitely/not/here.tar.gz", work.path())
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_other_schemes() {
        let work = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileFetcher::new().fetch("https://example.com/a.tar.gz", work.path()),
            Err(FetchError::UnsupportedScheme(_))
        ));
    }
}
