use crate::{archive_file_name, parse_url, FetchError, FetchOptions, FetchedArtifact, Fetcher};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// HTTP(S) fetcher backed by a blocking `ureq` agent.
///
/// - any status outside 2xx after redirects → [`FetchError::Status`]
/// - more than `max_redirects` hops (redirect loops) → [`FetchError::Transport`]
/// - whole request exceeding `timeout` → [`FetchError::Timeout`]
pub struct HttpFetcher {
    options: FetchOptions,
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(options.timeout))
            .max_redirects(options.max_redirects)
            .build();
        let agent = ureq::Agent::new_with_config(config);
        Self { options, agent }
    }

    fn do_get(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let req = self
            .agent
            .get(url)
            .header("User-Agent", &self.options.user_agent);
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(FetchError::NotFound(url.to_owned()));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(FetchError::Status {
                    url: url.to_owned(),
                    status: code,
                });
            }
            Err(ureq::Error::Timeout(_)) => {
                return Err(FetchError::Timeout {
                    url: url.to_owned(),
                    seconds: self.options.timeout.as_secs(),
                });
            }
            Err(e) => {
                return Err(FetchError::Transport {
                    url: url.to_owned(),
                    reason: e.to_string(),
                });
            }
        };

        let code = resp.status().as_u16();
        if !(200..300).contains(&code) {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: code,
            });
        }

        let mut reader = resp.into_body().into_reader();
        let mut writer = BufWriter::new(File::create(dest)?);
        let written = io::copy(&mut reader, &mut writer).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                FetchError::Timeout {
                    url: url.to_owned(),
                    seconds: self.options.timeout.as_secs(),
                }
            } else {
                FetchError::Transport {
                    url: url.to_owned(),
                    reason: e.to_string(),
                }
            }
        })?;
        writer.flush()?;
        Ok(written)
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch(&self, url: &str, work_dir: &Path) -> Result<FetchedArtifact, FetchError> {
        let parsed = parse_url(url)?;
        let (dir, dest) = FetchedArtifact::reserve(work_dir, &archive_file_name(&parsed))?;
        tracing::debug!("GET {url}");
        // On error `dir` drops here and takes any partial download with it.
        let size = self.do_get(url, &dest)?;
        tracing::debug!("fetched {size} bytes into {}", dest.display());
        Ok(FetchedArtifact::new(dir, dest, size))
    }
}
