//! # Cache Handler
//!
//! Single entry point mapping `(video id, url)` to a playable local file.
//! The metadata store and downloader are injected; the handler is the only
//! component that writes or deletes metadata records.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::fs;
use tokio::io;
use tracing::{debug, info, warn};

use crate::cache::metadata::{KvMetadataStore, MetadataStore};
use crate::cache::providers::FileKeyValueStore;
use crate::cache::types::{
    CacheConfig, CacheStatus, Eviction, ResolvedVideo, VideoId, VideoMetadataRecord,
};
use crate::downloader::{HttpDownloader, VideoDownloader};
use crate::error::{CacheError, CacheResult};
use crate::{DownloadError, DownloaderConfig};

type FillResult = Result<PathBuf, Arc<DownloadError>>;
type FillFuture = Shared<BoxFuture<'static, FillResult>>;
type InFlight = Arc<Mutex<HashMap<VideoId, FillFuture>>>;

/// Drops the in-flight entry when a fill finishes, including on panic
struct Unregister {
    registry: InFlight,
    id: VideoId,
}

impl Drop for Unregister {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

#[derive(Clone)]
pub struct CacheHandler {
    store: Arc<dyn MetadataStore>,
    downloader: Arc<dyn VideoDownloader>,
    in_flight: InFlight,
    config: Arc<CacheConfig>,
}

impl CacheHandler {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        downloader: Arc<dyn VideoDownloader>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            downloader,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// Handler persisting metadata as files and downloading over HTTP
    pub fn from_config(
        config: CacheConfig,
        downloader_config: DownloaderConfig,
    ) -> Result<Self, DownloadError> {
        let kv = FileKeyValueStore::new(config.metadata_dir());
        let store = KvMetadataStore::with_prefix(kv, config.key_prefix.clone());
        let downloader = HttpDownloader::new(
            downloader_config,
            config.document_dir(),
            config.file_extension.clone(),
        )?;

        info!(
            documents = ?config.document_dir(),
            metadata = ?config.metadata_dir(),
            "Video cache initialized"
        );
        Ok(Self::new(Arc::new(store), Arc::new(downloader), config))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return a local path for `video_id`, downloading `url` on a miss.
    ///
    /// Storage failures while reading metadata are logged and treated as a
    /// miss. A failed download leaves the metadata untouched.
    pub async fn resolve(&self, video_id: &str, url: &str) -> CacheResult<ResolvedVideo> {
        let id = VideoId::parse(video_id)?;

        if let Some(record) = self.cached_record(&id).await {
            debug!(video_id = %id, path = ?record.local_path, "Cache hit");
            return Ok(ResolvedVideo {
                path: record.local_path,
                status: CacheStatus::Hit,
            });
        }

        debug!(video_id = %id, url = %url, "Cache miss");
        let (fill, status) = if self.config.coalesce_downloads {
            self.join_or_start_fill(&id, url)
        } else {
            (self.spawn_fill(id.clone(), url.to_string(), None), CacheStatus::Miss)
        };

        let path = fill.await.map_err(CacheError::Download)?;
        Ok(ResolvedVideo { path, status })
    }

    /// The record for `video_id` if its file is still on disk
    pub async fn lookup(&self, video_id: &str) -> CacheResult<Option<VideoMetadataRecord>> {
        let id = VideoId::parse(video_id)?;
        Ok(self.cached_record(&id).await)
    }

    /// Delete the cached file and its metadata.
    ///
    /// Every step runs even when an earlier one fails; the first failure is
    /// returned once the others have been attempted.
    pub async fn evict(&self, video_id: &str) -> CacheResult<Eviction> {
        let id = VideoId::parse(video_id)?;
        self.evict_id(&id).await
    }

    /// Every record currently in the metadata store
    pub async fn cached_videos(&self) -> CacheResult<Vec<VideoMetadataRecord>> {
        self.store.list().await
    }

    /// Evict every entry in the metadata namespace, returning how many were
    /// removed. Entries are addressed by their storage key, so unreadable
    /// records and records filed under an invalid id are cleared too.
    pub async fn evict_all(&self) -> CacheResult<usize> {
        let mut evicted = 0;
        let mut first_error = None;

        for stored_id in self.store.stored_ids().await? {
            let outcome = match VideoId::parse(&stored_id) {
                Ok(id) => self.evict_id(&id).await,
                Err(e) => {
                    // The record's path cannot be trusted, only the metadata goes
                    warn!(video_id = %stored_id, error = %e, "Removing metadata stored under an invalid video id");
                    self.store
                        .remove_stored(&stored_id)
                        .await
                        .map(|()| Eviction::Evicted {
                            path: None,
                            file_deleted: false,
                        })
                }
            };

            match outcome {
                Ok(Eviction::Evicted { .. }) => evicted += 1,
                Ok(Eviction::NotCached) => {}
                Err(e) => {
                    warn!(video_id = %stored_id, error = %e, "Failed to evict video");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(evicted),
        }
    }

    async fn evict_id(&self, id: &VideoId) -> CacheResult<Eviction> {
        let record = match self.store.get(id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                debug!(video_id = %id, "Nothing cached to evict");
                return Ok(Eviction::NotCached);
            }
            // Unreadable records are still removed below
            Err(e) => {
                warn!(video_id = %id, error = %e, "Failed to read metadata during eviction");
                None
            }
        };

        let mut first_error: Option<CacheError> = None;
        let mut file_deleted = false;
        let path = record.map(|r| r.local_path);

        if let Some(path) = &path {
            match fs::remove_file(path).await {
                Ok(()) => {
                    file_deleted = true;
                    info!(video_id = %id, path = ?path, "Deleted cached video");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(video_id = %id, path = ?path, "Cached video already gone");
                }
                Err(e) => {
                    warn!(video_id = %id, path = ?path, error = %e, "Failed to delete cached video");
                    first_error = Some(CacheError::Eviction(e));
                }
            }
        }

        match self.store.remove(id).await {
            Ok(()) => info!(video_id = %id, "Deleted video metadata"),
            Err(e) => {
                warn!(video_id = %id, error = %e, "Failed to delete video metadata");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Eviction::Evicted { path, file_deleted }),
        }
    }

    async fn cached_record(&self, id: &VideoId) -> Option<VideoMetadataRecord> {
        let record = match self.store.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(video_id = %id, error = %e, "Failed to get video metadata");
                return None;
            }
        };

        match fs::try_exists(&record.local_path).await {
            Ok(true) => Some(record),
            Ok(false) => {
                debug!(video_id = %id, path = ?record.local_path, "Cached file missing, refetching");
                None
            }
            Err(e) => {
                warn!(video_id = %id, path = ?record.local_path, error = %e, "Failed to check cached file");
                None
            }
        }
    }

    fn join_or_start_fill(&self, id: &VideoId, url: &str) -> (FillFuture, CacheStatus) {
        // Held across spawn + insert so the task cannot unregister before it is registered
        let mut in_flight = self.in_flight.lock();
        if let Some(fill) = in_flight.get(id) {
            debug!(video_id = %id, "Joining in-flight download");
            return (fill.clone(), CacheStatus::Joined);
        }

        let fill = self.spawn_fill(id.clone(), url.to_string(), Some(self.in_flight.clone()));
        in_flight.insert(id.clone(), fill.clone());
        (fill, CacheStatus::Miss)
    }

    /// Download then record metadata, file first so metadata never points
    /// at a file that was not written.
    fn spawn_fill(&self, id: VideoId, url: String, registry: Option<InFlight>) -> FillFuture {
        let store = self.store.clone();
        let downloader = self.downloader.clone();

        let task = tokio::spawn(async move {
            let _unregister = registry.map(|registry| Unregister {
                registry,
                id: id.clone(),
            });

            match downloader.download(&url, &id).await {
                Ok(path) => {
                    if let Err(e) = store.put(&id, &path).await {
                        // The file is valid; the next resolve refetches it
                        warn!(video_id = %id, error = %e, "Failed to save video metadata");
                    }
                    Ok(path)
                }
                Err(e) => Err(Arc::new(e)),
            }
        });

        let fill = async move {
            match task.await {
                Ok(outcome) => outcome,
                // Only reachable if the download panicked
                Err(e) => Err(Arc::new(DownloadError::IoError(io::Error::other(format!(
                    "fill task failed: {e}"
                ))))),
            }
        };

        fill.boxed().shared()
    }
}
