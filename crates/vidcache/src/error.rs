use reqwest::StatusCode;
use std::sync::Arc;

// Error type for a single video transfer
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("Server returned status code {0}")]
    StatusCode(StatusCode),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether another attempt at the same URL could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpError(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            DownloadError::StatusCode(status) => status.is_server_error(),
            _ => false,
        }
    }
}

/// Errors surfaced by the cache layer
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid video id {0:?}")]
    InvalidVideoId(String),

    #[error("Metadata storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Corrupt metadata record under key {key}: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize metadata record: {0}")]
    Serialize(#[source] serde_json::Error),

    // Shared between every caller that joined the same fill
    #[error("Download failed: {0}")]
    Download(Arc<DownloadError>),

    #[error("Failed to delete cached file: {0}")]
    Eviction(#[source] std::io::Error),
}

impl From<DownloadError> for CacheError {
    fn from(err: DownloadError) -> Self {
        CacheError::Download(Arc::new(err))
    }
}

/// Result of a cache operation
pub type CacheResult<T> = std::result::Result<T, CacheError>;
