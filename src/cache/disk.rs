use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::CacheBackend;
use crate::error::StorageResult;
use crate::storage::JsonStore;

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    value: Value,
    stored_at: DateTime<Utc>,
    ttl_secs: u64,
}

impl DiskEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.stored_at).num_seconds() > self.ttl_secs as i64
    }
}

/// Cache persisted as one JSON file per key.
#[derive(Debug, Clone)]
pub struct DiskCache {
    store: JsonStore,
    ttl: Duration,
}

impl DiskCache {
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> StorageResult<Self> {
        Ok(Self {
            store: JsonStore::open(dir)?,
            ttl,
        })
    }

    /// File name for a key: hex SHA-256 plus `.json`.
    pub fn file_name(key: &str) -> String {
        format!("{}.json", hex::encode(Sha256::digest(key.as_bytes())))
    }

    fn get_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let name = Self::file_name(key);
        let entry = match self.store.try_load::<DiskEntry>(&name) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, file = %name, "Discarding unreadable cache entry");
                self.discard(&name);
                return None;
            }
        };

        if entry.is_expired(now) {
            self.discard(&name);
            return None;
        }
        Some(entry.value)
    }

    fn discard(&self, name: &str) {
        if let Err(e) = self.store.delete(name) {
            warn!(error = %e, file = %name, "Failed to delete cache entry");
        }
    }

    fn entry_names(&self) -> Vec<String> {
        match self.store.list("", ".json") {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list cache directory");
                Vec::new()
            }
        }
    }
}

impl CacheBackend for DiskCache {
    fn get(&mut self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now())
    }

    fn set(&mut self, key: &str, value: Value) -> StorageResult<()> {
        let entry = DiskEntry {
            value,
            stored_at: Utc::now(),
            ttl_secs: self.ttl.as_secs(),
        };
        self.store.save(&Self::file_name(key), &entry)
    }

    fn remove(&mut self, key: &str) -> StorageResult<bool> {
        self.store.delete(&Self::file_name(key))
    }

    fn clear(&mut self) -> StorageResult<()> {
        for name in self.store.list("", ".json")? {
            self.store.delete(&name)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entry_names().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> DiskCache {
        DiskCache::open(dir.path(), Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_file_name_is_sha256_hex() {
        let name = DiskCache::file_name("abc");
        assert_eq!(
            name,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.json"
        );
    }

    #[test]
    fn test_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);

        cache.set("user:input", json!({"decision": "hold"})).unwrap();
        assert_eq!(cache.get("user:input"), Some(json!({"decision": "hold"})));
        assert_eq!(cache.len(), 1);

        assert!(cache.remove("user:input").unwrap());
        assert!(cache.get("user:input").is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        cache(&dir).set("k", json!(42)).unwrap();

        let mut reopened = cache(&dir);
        assert_eq!(reopened.get("k"), Some(json!(42)));
    }

    #[test]
    fn test_expired_entry_is_deleted() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        cache.set("k", json!(1)).unwrap();

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert!(cache.get_at("k", later).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_deleted() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let path = dir.path().join(DiskCache::file_name("k"));
        fs::write(&path, "{broken").unwrap();

        assert!(cache.get("k").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        cache.set("a", json!(1)).unwrap();
        cache.set("b", json!(2)).unwrap();

        cache.clear().unwrap();
        assert!(cache.is_empty());
    }
}
