//! # Vidcache
//!
//! Client-side video cache for the clinic's patient-education videos.
//! Given a video id and its source URL it returns a local, playable file,
//! downloading only when no valid copy is on disk.
//!
//! ## Features
//!
//! - Namespaced metadata records in a shared key-value store
//! - Deterministic `<documents>/<id>.mp4` downloads, written atomically
//! - Self-healing when a cached file disappears out-of-band
//! - Concurrent misses for one video collapse into a single download
//! - Best-effort eviction of the file together with its metadata

pub mod builder;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;

pub use builder::DownloaderConfigBuilder;
pub use cache::{
    CacheConfig, CacheHandler, CacheStatus, Eviction, ResolvedVideo, VideoId, VideoMetadataRecord,
};
pub use config::DownloaderConfig;
pub use error::{CacheError, CacheResult, DownloadError};

// Re-export downloader utilities
pub use downloader::{HttpDownloader, VideoDownloader, create_client};
