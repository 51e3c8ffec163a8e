use std::time::Duration;

/// Default whole-request timeout for downloads.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Transport settings for [`HttpFetcher`](crate::HttpFetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound on the whole request, body included.
    pub timeout: Duration,
    /// Redirects followed before the fetch fails as a redirect loop.
    pub max_redirects: u32,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: format!("brewline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}
