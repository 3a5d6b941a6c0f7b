//! # File Key-Value Store
//!
//! A directory of small JSON documents, one per key. File names are the
//! SHA-256 of the key so arbitrary keys are safe on every filesystem; the
//! original key is stored inside the document for enumeration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use super::KeyValueStore;

const ENTRY_EXTENSION: &str = "json";

// Per-write suffix so concurrent writers of one key never share a temp file
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    value: String,
}

#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    initialized: Arc<AtomicBool>,
}

impl FileKeyValueStore {
    /// Create a store rooted at `dir`; the directory is created lazily
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub(crate) async fn ensure_initialized(&self) -> io::Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        // create_dir_all is idempotent, racing initializers are harmless
        fs::create_dir_all(&self.dir).await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        self.dir.join(format!("{hash:x}.{ENTRY_EXTENSION}"))
    }

    fn temp_path(entry: &Path) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        entry.with_extension(format!("{}-{n}.tmp", std::process::id()))
    }

    async fn read_entry(&self, path: &PathBuf) -> io::Result<Option<StoredEntry>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        let path = self.entry_path(key);
        match self.read_entry(&path).await? {
            Some(entry) if entry.key == key => Ok(Some(entry.value)),
            Some(entry) => {
                warn!(path = ?path, stored_key = %entry.key, key = %key, "Key mismatch in store entry");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        self.ensure_initialized().await?;

        let path = self.entry_path(key);
        let entry = StoredEntry {
            key: key.to_string(),
            value: value.to_string(),
        };
        let json = serde_json::to_vec(&entry).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize store entry: {e}"),
            )
        })?;

        // Write to a temporary file then rename over the entry
        let temp_path = Self::temp_path(&path);
        if let Err(e) = fs::write(&temp_path, &json).await {
            warn!(path = ?temp_path, error = %e, "Failed to write store entry");
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            warn!(
                from = ?temp_path,
                to = ?path,
                error = %e,
                "Failed to rename temporary store entry"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!(key = %key, "Stored entry");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> io::Result<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to remove store entry");
                Err(e)
            }
        }
    }

    async fn keys(&self) -> io::Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                warn!(dir = ?self.dir, error = %e, "Failed to read store directory");
                return Err(e);
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            match self.read_entry(&path).await {
                Ok(Some(stored)) => keys.push(stored.key),
                Ok(None) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable store entry"),
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_get_overwrite() {
        let dir = tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("kv"));

        assert_eq!(store.get_item("theme").await.unwrap(), None);

        store.set_item("theme", "dark").await.unwrap();
        store.set_item("theme", "light").await.unwrap();
        assert_eq!(store.get_item("theme").await.unwrap().as_deref(), Some("light"));

        // No temporary files are left behind
        let mut names = Vec::new();
        let mut entries = fs::read_dir(store.dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_values_survive_a_new_instance() {
        let dir = tempdir().unwrap();
        FileKeyValueStore::new(dir.path())
            .set_item("video_metadata_a", "{\"x\":1}")
            .await
            .unwrap();

        let reopened = FileKeyValueStore::new(dir.path());
        assert_eq!(
            reopened.get_item("video_metadata_a").await.unwrap().as_deref(),
            Some("{\"x\":1}")
        );
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_ok() {
        let dir = tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path());

        store.remove_item("never-written").await.unwrap();
        store.set_item("k", "v").await.unwrap();
        store.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_lists_original_keys() {
        let dir = tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("missing-yet"));
        assert!(store.keys().await.unwrap().is_empty());

        for key in ["b/with/slashes", "a", "c:colon"] {
            store.set_item(key, "1").await.unwrap();
        }
        // Stray files are ignored
        fs::write(store.dir().join("notes.txt"), b"hi").await.unwrap();

        assert_eq!(
            store.keys().await.unwrap(),
            vec!["a".to_string(), "b/with/slashes".to_string(), "c:colon".to_string()]
        );
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_one_key() {
        let dir = tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path());
        let values: Vec<String> = (0..8).map(|i| format!("{{\"n\":{i}}}")).collect();

        for _ in 0..20 {
            let writes = values.iter().map(|v| {
                let store = store.clone();
                let v = v.clone();
                tokio::spawn(async move { store.set_item("video_metadata_abc123", &v).await })
            });
            let reader = {
                let store = store.clone();
                tokio::spawn(async move { store.get_item("video_metadata_abc123").await })
            };

            for result in futures::future::join_all(writes).await {
                result.unwrap().unwrap();
            }
            if let Some(read) = reader.await.unwrap().unwrap() {
                assert!(values.contains(&read));
            }

            let last = store.get_item("video_metadata_abc123").await.unwrap().unwrap();
            assert!(values.contains(&last));
        }

        // Only the entry itself remains
        let mut entries = fs::read_dir(store.dir()).await.unwrap();
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert!(entry.file_name().to_string_lossy().ends_with(".json"));
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path());
        store.set_item("k", "v").await.unwrap();
        fs::write(store.entry_path("k"), b"{not json").await.unwrap();

        let err = store.get_item("k").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
