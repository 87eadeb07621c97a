//! Decision caches.
//!
//! [`CacheManager`] keeps entries in memory with LRU eviction and a TTL.
//! [`DiskCache`] persists one JSON document per key through a
//! [`JsonStore`](crate::storage::JsonStore). Both implement [`CacheBackend`].

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::{CacheEntry, CacheManager};

use serde_json::Value;

use crate::error::StorageResult;

/// Key/value cache holding JSON values.
pub trait CacheBackend: Send + Sync {
    /// Get a live value. Expired entries are dropped and count as misses.
    fn get(&mut self, key: &str) -> Option<Value>;
    /// Insert or replace a value.
    fn set(&mut self, key: &str, value: Value) -> StorageResult<()>;
    /// Remove a value. Returns whether it was present.
    fn remove(&mut self, key: &str) -> StorageResult<bool>;
    /// Drop every entry.
    fn clear(&mut self) -> StorageResult<()>;
    /// Number of stored entries, expired or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
