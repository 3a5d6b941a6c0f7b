use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::VideoId;
use crate::{DownloadError, DownloaderConfig};

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings for downloads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for downloads");
    }

    client_builder.build().map_err(DownloadError::from)
}

/// Fetches a remote video into a deterministic local file
#[async_trait]
pub trait VideoDownloader: Send + Sync {
    /// Where the file for `video_id` lives once downloaded
    fn target_path(&self, video_id: &VideoId) -> PathBuf;

    /// Download `url` to [`target_path`](Self::target_path), returning that path
    async fn download(&self, url: &str, video_id: &VideoId) -> Result<PathBuf, DownloadError>;
}

/// Upper bound for a single backoff sleep
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// `base * 2^(attempt - 1)`, saturating and capped at [`MAX_RETRY_DELAY`]
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

// Distinguishes partial files of overlapping downloads for the same video
static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

const PART_EXTENSION: &str = "part";

/// Partial files untouched for this long are left over from a crash
const STALE_PART_AGE: Duration = Duration::from_secs(60 * 60);

/// HTTP(S) GET downloader writing to `<document_dir>/<video_id>.<ext>`
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    config: DownloaderConfig,
    document_dir: PathBuf,
    extension: String,
    parts_swept: Arc<AtomicBool>,
}

impl HttpDownloader {
    pub fn new(
        config: DownloaderConfig,
        document_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Result<Self, DownloadError> {
        let client = create_client(&config)?;
        Ok(Self::with_client(client, config, document_dir, extension))
    }

    /// Reuse an existing client, e.g. one shared with the rest of the app
    pub fn with_client(
        client: Client,
        config: DownloaderConfig,
        document_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            document_dir: document_dir.into(),
            extension: extension.into(),
            parts_swept: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn document_dir(&self) -> &Path {
        &self.document_dir
    }

    fn part_path(&self, target: &Path) -> PathBuf {
        let n = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}-{n}.{PART_EXTENSION}", std::process::id()));
        target.with_file_name(name)
    }

    /// Remove partial files abandoned by an earlier crash, once per downloader.
    /// Active downloads keep their part file's mtime fresh and are left alone.
    async fn sweep_stale_parts(&self) {
        if self.parts_swept.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut entries = match fs::read_dir(&self.document_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?self.document_dir, error = %e, "Failed to scan for stale partial downloads");
                return;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = ?self.document_dir, error = %e, "Failed to scan for stale partial downloads");
                    break;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PART_EXTENSION) {
                continue;
            }

            let stale = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified
                    .elapsed()
                    .is_ok_and(|age| age >= STALE_PART_AGE),
                Err(_) => false,
            };
            if !stale {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?path, error = %e, "Failed to remove stale partial download"),
            }
        }

        if removed > 0 {
            info!(dir = ?self.document_dir, removed, "Removed stale partial downloads");
        }
    }

    /// Streams the response body into `part_path`, returning the bytes written
    async fn fetch_once(&self, url: &Url, part_path: &Path) -> Result<u64, DownloadError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::StatusCode(status));
        }

        let mut file = fs::File::create(part_path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    /// Retries on connection errors, timeouts and 5xx responses
    async fn fetch_with_retries(&self, url: &Url, part_path: &Path) -> Result<u64, DownloadError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.fetch_once(url, part_path).await {
                Ok(written) => return Ok(written),
                Err(e) if e.is_retryable() && attempts <= self.config.max_retries => {
                    let delay = retry_delay(self.config.retry_delay_base, attempts);
                    warn!(
                        url = %url,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Video download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl VideoDownloader for HttpDownloader {
    fn target_path(&self, video_id: &VideoId) -> PathBuf {
        self.document_dir
            .join(format!("{}.{}", video_id, self.extension))
    }

    async fn download(&self, url: &str, video_id: &VideoId) -> Result<PathBuf, DownloadError> {
        let url = Url::parse(url).map_err(|e| {
            warn!(url = %url, error = %e, "Invalid video URL");
            DownloadError::UrlError(format!("{url}: {e}"))
        })?;

        fs::create_dir_all(&self.document_dir).await?;
        self.sweep_stale_parts().await;

        let target = self.target_path(video_id);
        let part_path = self.part_path(&target);
        debug!(video_id = %video_id, url = %url, path = ?target, "Downloading video");

        let result = match self.fetch_with_retries(&url, &part_path).await {
            // Rename over the target so it only ever holds a complete file
            Ok(written) => fs::rename(&part_path, &target)
                .await
                .map(|_| written)
                .map_err(DownloadError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(written) => {
                info!(video_id = %video_id, path = ?target, bytes = written, "Downloaded video");
                Ok(target)
            }
            Err(e) => {
                warn!(video_id = %video_id, url = %url, error = %e, "Failed to download video");
                if let Err(rm) = fs::remove_file(&part_path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = ?part_path, error = %rm, "Failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }
}
