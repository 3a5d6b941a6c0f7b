//! # Metadata Store
//!
//! Maps a video id to its [`VideoMetadataRecord`] inside a shared key-value
//! store. Every key is namespaced with a prefix so the store can hold
//! unrelated application settings without collisions.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::providers::KeyValueStore;
use crate::cache::types::{DEFAULT_KEY_PREFIX, VideoId, VideoMetadataRecord};
use crate::error::{CacheError, CacheResult};

/// Durable mapping from video id to metadata record
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read the record for `video_id`, `None` when absent
    async fn get(&self, video_id: &VideoId) -> CacheResult<Option<VideoMetadataRecord>>;

    /// Write a fresh record for `video_id`, replacing any existing one
    async fn put(&self, video_id: &VideoId, local_path: &Path)
    -> CacheResult<VideoMetadataRecord>;

    /// Delete the record for `video_id`; missing records are fine
    async fn remove(&self, video_id: &VideoId) -> CacheResult<()>;

    /// Every readable record in the namespace
    async fn list(&self) -> CacheResult<Vec<VideoMetadataRecord>>;

    /// The id part of every key in the namespace, readable or not.
    /// Ids are returned as stored and may not be valid [`VideoId`]s.
    async fn stored_ids(&self) -> CacheResult<Vec<String>>;

    /// Delete the entry stored under a raw id from [`stored_ids`](Self::stored_ids)
    async fn remove_stored(&self, stored_id: &str) -> CacheResult<()>;
}

/// [`MetadataStore`] over any [`KeyValueStore`]
#[derive(Debug, Clone)]
pub struct KvMetadataStore<S> {
    store: S,
    prefix: String,
}

impl<S: KeyValueStore> KvMetadataStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_prefix(store, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    fn key(&self, video_id: &str) -> String {
        format!("{}{}", self.prefix, video_id)
    }

    fn decode(&self, key: &str, raw: &str) -> CacheResult<VideoMetadataRecord> {
        let mut record: VideoMetadataRecord =
            serde_json::from_str(raw).map_err(|source| CacheError::CorruptRecord {
                key: key.to_string(),
                source,
            })?;

        if record.video_id.is_empty() {
            record.video_id = key[self.prefix.len()..].to_string();
        }
        Ok(record)
    }
}

#[async_trait]
impl<S: KeyValueStore> MetadataStore for KvMetadataStore<S> {
    async fn get(&self, video_id: &VideoId) -> CacheResult<Option<VideoMetadataRecord>> {
        let key = self.key(video_id.as_str());
        match self.store.get_item(&key).await? {
            Some(raw) => self.decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        video_id: &VideoId,
        local_path: &Path,
    ) -> CacheResult<VideoMetadataRecord> {
        let key = self.key(video_id.as_str());
        let record = VideoMetadataRecord::new(video_id, local_path);
        let json = serde_json::to_string(&record).map_err(CacheError::Serialize)?;

        self.store.set_item(&key, &json).await?;
        debug!(video_id = %video_id, path = ?local_path, "Saved video metadata");
        Ok(record)
    }

    async fn remove(&self, video_id: &VideoId) -> CacheResult<()> {
        self.remove_stored(video_id.as_str()).await
    }

    async fn list(&self) -> CacheResult<Vec<VideoMetadataRecord>> {
        let mut records = Vec::new();

        for key in self.store.keys().await? {
            if !key.starts_with(&self.prefix) {
                continue;
            }

            let raw = match self.store.get_item(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read video metadata");
                    continue;
                }
            };

            match self.decode(&key, &raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, error = %e, "Skipping corrupt video metadata"),
            }
        }

        Ok(records)
    }

    async fn stored_ids(&self) -> CacheResult<Vec<String>> {
        Ok(self
            .store
            .keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    async fn remove_stored(&self, stored_id: &str) -> CacheResult<()> {
        let key = self.key(stored_id);
        self.store.remove_item(&key).await?;
        debug!(video_id = %stored_id, "Removed video metadata");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::providers::MemoryKeyValueStore;
    use std::io;
    use std::path::PathBuf;

    /// Store whose every operation fails, for exercising error paths
    #[derive(Debug, Default, Clone)]
    pub(crate) struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get_item(&self, _key: &str) -> io::Result<Option<String>> {
            Err(io::Error::other("storage offline"))
        }

        async fn set_item(&self, _key: &str, _value: &str) -> io::Result<()> {
            Err(io::Error::other("storage offline"))
        }

        async fn remove_item(&self, _key: &str) -> io::Result<()> {
            Err(io::Error::other("storage offline"))
        }

        async fn keys(&self) -> io::Result<Vec<String>> {
            Err(io::Error::other("storage offline"))
        }
    }

    fn id(raw: &str) -> VideoId {
        VideoId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let kv = MemoryKeyValueStore::new();
        let store = KvMetadataStore::new(kv.clone());

        assert_eq!(store.get(&id("abc123")).await.unwrap(), None);

        let written = store
            .put(&id("abc123"), Path::new("/docs/abc123.mp4"))
            .await
            .unwrap();
        let read = store.get(&id("abc123")).await.unwrap().unwrap();

        assert_eq!(read, written);
        assert_eq!(read.video_id, "abc123");
        assert_eq!(read.local_path, PathBuf::from("/docs/abc123.mp4"));
        // Stored under the namespaced key
        assert_eq!(kv.keys().await.unwrap(), vec!["video_metadata_abc123".to_string()]);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = KvMetadataStore::new(MemoryKeyValueStore::new());
        let first = store.put(&id("v"), Path::new("/old.mp4")).await.unwrap();
        let second = store.put(&id("v"), Path::new("/new.mp4")).await.unwrap();

        let read = store.get(&id("v")).await.unwrap().unwrap();
        assert_eq!(read.local_path, PathBuf::from("/new.mp4"));
        assert!(second.fetched_at >= first.fetched_at);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = KvMetadataStore::new(MemoryKeyValueStore::new());
        store.put(&id("v"), Path::new("/v.mp4")).await.unwrap();

        store.remove(&id("v")).await.unwrap();
        store.remove(&id("v")).await.unwrap();
        assert_eq!(store.get(&id("v")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let kv = MemoryKeyValueStore::new();
        kv.set_item("video_metadata_v", "{oops").await.unwrap();
        let store = KvMetadataStore::new(kv);

        let err = store.get(&id("v")).await.unwrap_err();
        assert!(matches!(err, CacheError::CorruptRecord { ref key, .. } if key == "video_metadata_v"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let store = KvMetadataStore::new(BrokenStore);

        assert!(matches!(store.get(&id("v")).await, Err(CacheError::Storage(_))));
        assert!(matches!(
            store.put(&id("v"), Path::new("/v.mp4")).await,
            Err(CacheError::Storage(_))
        ));
        assert!(matches!(store.remove(&id("v")).await, Err(CacheError::Storage(_))));
    }

    #[tokio::test]
    async fn test_list_skips_foreign_and_corrupt_keys() {
        let kv = MemoryKeyValueStore::new();
        kv.set_item("user_theme", "dark").await.unwrap();
        kv.set_item("video_metadata_bad", "not json").await.unwrap();
        kv.set_item(
            "video_metadata_legacy",
            r#"{"path":"/docs/legacy.mp4","timestamp":"2024-05-01T10:20:30.000Z"}"#,
        )
        .await
        .unwrap();

        let store = KvMetadataStore::new(kv);
        store.put(&id("fresh"), Path::new("/docs/fresh.mp4")).await.unwrap();

        let mut ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.video_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["fresh".to_string(), "legacy".to_string()]);
    }

    #[tokio::test]
    async fn test_stored_ids_include_unreadable_entries() {
        let kv = MemoryKeyValueStore::new();
        kv.set_item("user_theme", "dark").await.unwrap();
        kv.set_item("video_metadata_bad", "not json").await.unwrap();
        kv.set_item("video_metadata_a/b", "{}").await.unwrap();
        let store = KvMetadataStore::new(kv.clone());
        store.put(&id("fresh"), Path::new("/docs/fresh.mp4")).await.unwrap();

        let mut ids = store.stored_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a/b", "bad", "fresh"]);

        store.remove_stored("a/b").await.unwrap();
        assert!(kv.get_item("video_metadata_a/b").await.unwrap().is_none());
        assert_eq!(kv.len(), 3);
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let kv = MemoryKeyValueStore::new();
        let store = KvMetadataStore::with_prefix(kv.clone(), "clinic_");
        store.put(&id("v"), Path::new("/v.mp4")).await.unwrap();

        assert_eq!(store.prefix(), "clinic_");
        assert!(kv.get_item("clinic_v").await.unwrap().is_some());
        assert!(kv.get_item("video_metadata_v").await.unwrap().is_none());
    }
}
