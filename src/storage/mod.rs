//! Storage Module
//!
//! Durable string-keyed, string-valued store shared by the cache and the sync
//! queues. The two partition the key space by prefix.

mod file;
mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use file::{FileStore, MAX_KEY_BYTES};
pub use memory::MemoryStore;

// == Key-Value Store ==
/// Async persistent key-value store.
///
/// Every operation may fail on I/O. `remove` and `remove_many` tolerate absent keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Removes `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Lists every key currently stored.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Removes all of `keys`.
    async fn remove_many(&self, keys: &[String]) -> Result<()>;
}
