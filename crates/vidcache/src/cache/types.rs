//! # Cache Types
//!
//! Common types used across the video cache.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Namespace prepended to every metadata key in the shared key-value store
pub const DEFAULT_KEY_PREFIX: &str = "video_metadata_";

/// Extension of downloaded video files
pub const DEFAULT_FILE_EXTENSION: &str = "mp4";

/// Identifier of a video in the remote catalog.
///
/// The id doubles as the file stem of the cached download, so anything that
/// could escape the document directory is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VideoId(String);

impl VideoId {
    pub fn parse(raw: impl Into<String>) -> CacheResult<Self> {
        let raw = raw.into();
        let invalid = raw.is_empty()
            || raw == "."
            || raw == ".."
            || raw.contains(['/', '\\', '\0']);
        if invalid {
            return Err(CacheError::InvalidVideoId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Metadata persisted for a downloaded video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadataRecord {
    /// Older records did not store the id, it is recovered from the key
    #[serde(default)]
    pub video_id: String,
    /// Absolute path of the downloaded file
    #[serde(alias = "path")]
    pub local_path: PathBuf,
    /// When the file was downloaded
    #[serde(alias = "timestamp")]
    pub fetched_at: DateTime<Utc>,
}

impl VideoMetadataRecord {
    pub fn new(video_id: &VideoId, local_path: impl Into<PathBuf>) -> Self {
        Self {
            video_id: video_id.to_string(),
            local_path: local_path.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// How a resolve request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// File found on disk, no network access
    Hit,
    /// This request downloaded the file
    Miss,
    /// This request waited on a download started by another request
    Joined,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Joined => "joined",
        };
        f.write_str(s)
    }
}

/// A playable local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVideo {
    pub path: PathBuf,
    pub status: CacheStatus,
}

/// Outcome of evicting a single video
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eviction {
    /// No metadata existed, nothing was touched
    NotCached,
    /// Metadata removed; `file_deleted` is false when the file was already gone
    Evicted {
        path: Option<PathBuf>,
        file_deleted: bool,
    },
}

/// Configuration for the cache system
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory downloaded videos are written to
    pub document_dir: Option<PathBuf>,
    /// Directory backing the file key-value store
    pub metadata_dir: Option<PathBuf>,
    /// Prefix namespacing metadata keys
    pub key_prefix: String,
    /// Extension of cached video files
    pub file_extension: String,
    /// Collapse concurrent misses for one video into a single download
    pub coalesce_downloads: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            document_dir: None, // If None, we'll use system temp dir
            metadata_dir: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            coalesce_downloads: true,
        }
    }
}

impl CacheConfig {
    /// Cache root used when no directory is configured
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("vidcache")
    }

    pub fn document_dir(&self) -> PathBuf {
        self.document_dir
            .clone()
            .unwrap_or_else(|| Self::default_root().join("documents"))
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.metadata_dir
            .clone()
            .unwrap_or_else(|| Self::default_root().join("metadata"))
    }
}
