use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = concat!("vidcache/", env!("CARGO_PKG_VERSION"));

/// Configurable options for the video downloader
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Overall timeout for the entire HTTP request, zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Honor proxy environment variables (`HTTPS_PROXY`, `NO_PROXY`, ...)
    pub use_system_proxy: bool,

    /// Extra attempts after a retryable failure, zero disables retries
    pub max_retries: u32,

    /// Base delay for exponential backoff between attempts
    pub retry_delay_base: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            // Videos can be large; only the connect and read phases are bounded
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: DownloaderConfig::get_default_headers(),
            use_system_proxy: true,
            max_retries: 0,
            retry_delay_base: Duration::from_millis(500),
        }
    }
}

impl DownloaderConfig {
    pub fn builder() -> crate::builder::DownloaderConfigBuilder {
        crate::builder::DownloaderConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("video/mp4,video/*;q=0.9,*/*;q=0.8"),
        );

        default_headers
    }
}
