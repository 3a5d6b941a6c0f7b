//! # Key-Value Provider
//!
//! The storage facility the metadata store is built on. Keys and values are
//! plain strings; the store may be shared with unrelated application data.

use async_trait::async_trait;
use std::io;

/// A trait for durable string key-value stores
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get_item(&self, key: &str) -> io::Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_item(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove_item(&self, key: &str) -> io::Result<()>;

    /// Every key currently stored
    async fn keys(&self) -> io::Result<Vec<String>>;
}
