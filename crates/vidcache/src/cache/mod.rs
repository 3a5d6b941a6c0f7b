//! # Video Cache
//!
//! Local-first cache mapping a remote video to a downloaded file. Metadata
//! lives in a key-value store, files live in the document directory, and the
//! [`CacheHandler`] keeps the two in step.

// Module declarations
mod handler;
pub mod metadata;
pub mod providers;
mod types;

pub use handler::CacheHandler;
pub use metadata::{KvMetadataStore, MetadataStore};
pub use providers::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use types::{
    CacheConfig, CacheStatus, DEFAULT_FILE_EXTENSION, DEFAULT_KEY_PREFIX, Eviction,
    ResolvedVideo, VideoId, VideoMetadataRecord,
};
