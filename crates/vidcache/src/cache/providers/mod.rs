//! # Key-Value Providers
//!
//! Persistent string stores backing the metadata store.

pub use self::file::FileKeyValueStore;
pub use self::memory::MemoryKeyValueStore;
pub use self::provider::KeyValueStore;

// Provider interface
pub mod provider;

// Individual provider implementations
pub mod file;
pub mod memory;
