use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use tracing::debug;

use super::CacheBackend;
use crate::config::CacheConfig;
use crate::error::StorageResult;

/// A cached value with its insertion time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

/// In-memory LRU cache with a fixed TTL.
///
/// A zero `max_size` disables caching.
#[derive(Debug)]
pub struct CacheManager {
    ttl: Duration,
    entries: Option<LruCache<String, CacheEntry>>,
}

impl CacheManager {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            entries: NonZeroUsize::new(max_size).map(LruCache::new),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.ttl())
    }

    pub fn max_size(&self) -> usize {
        self.entries.as_ref().map_or(0, |c| c.cap().get())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<Value> {
        let entries = self.entries.as_mut()?;
        if entries.peek(key)?.is_expired(now) {
            entries.pop(key);
            debug!(key = %key, "Cache entry expired");
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    fn set_at(&mut self, key: &str, value: Value, now: Instant) {
        let Some(entries) = self.entries.as_mut() else {
            return;
        };

        let entry = CacheEntry {
            value,
            inserted_at: now,
            ttl: self.ttl,
        };
        if let Some((evicted, _)) = entries.push(key.to_string(), entry) {
            if evicted != key {
                debug!(key = %evicted, "Evicted least recently used cache entry");
            }
        }
    }
}

impl CacheBackend for CacheManager {
    fn get(&mut self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    fn set(&mut self, key: &str, value: Value) -> StorageResult<()> {
        self.set_at(key, value, Instant::now());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<bool> {
        Ok(self
            .entries
            .as_mut()
            .is_some_and(|entries| entries.pop(key).is_some()))
    }

    fn clear(&mut self) -> StorageResult<()> {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }
}
