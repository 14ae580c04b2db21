//! Durable Tier Module
//!
//! Persistent mirror of the in-memory tier. Backends keep a secondary index
//! from tag to keys so tag invalidation never needs a full scan.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::CacheEntry;
use crate::error::DurableError;

/// Entry shape stored by every durable backend.
pub type StoredEntry = CacheEntry<Value>;

// == Durable Store Trait ==
/// A persistent key-value store keyed by opaque string keys.
///
/// Every method may fail; `CacheEngine` treats failures as "durable tier
/// unavailable for this operation".
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, DurableError>;

    async fn put(&self, key: &str, entry: &StoredEntry) -> Result<(), DurableError>;

    /// Removes `key`, returning whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, DurableError>;

    /// Looks up the secondary tag index.
    async fn keys_for_tag(&self, tag: &str) -> Result<Vec<String>, DurableError>;

    /// Full scan, used by the TTL sweep.
    async fn entries(&self) -> Result<Vec<(String, StoredEntry)>, DurableError>;

    async fn clear(&self) -> Result<(), DurableError>;

    fn is_available(&self) -> bool {
        true
    }
}

// == Durable Index ==
/// Entries plus the tag -> keys secondary index.
#[derive(Debug, Default)]
struct DurableIndex {
    entries: HashMap<String, StoredEntry>,
    by_tag: HashMap<String, HashSet<String>>,
}

impl DurableIndex {
    fn from_entries(entries: HashMap<String, StoredEntry>) -> Self {
        let mut index = Self::default();
        for (key, entry) in entries {
            index.insert(key, entry);
        }
        index
    }

    fn insert(&mut self, key: String, entry: StoredEntry) {
        self.remove(&key);
        for tag in &entry.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(key.clone());
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for tag in &entry.tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        true
    }

    fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_tag.clear();
    }
}

fn lock(index: &Mutex<DurableIndex>) -> MutexGuard<'_, DurableIndex> {
    index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// == Memory Durable Store ==
/// In-process durable tier. Survives cache clears of the memory tier but not
/// process restarts.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    index: Mutex<DurableIndex>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.index).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, DurableError> {
        Ok(lock(&self.index).entries.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: &StoredEntry) -> Result<(), DurableError> {
        lock(&self.index).insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DurableError> {
        Ok(lock(&self.index).remove(key))
    }

    async fn keys_for_tag(&self, tag: &str) -> Result<Vec<String>, DurableError> {
        Ok(lock(&self.index).keys_for_tag(tag))
    }

    async fn entries(&self) -> Result<Vec<(String, StoredEntry)>, DurableError> {
        Ok(lock(&self.index)
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn clear(&self) -> Result<(), DurableError> {
        lock(&self.index).clear();
        Ok(())
    }
}

// == File Durable Store ==
/// Best-effort persisted snapshot.
///
/// The whole entry map is loaded at open and rewritten after every mutation
/// through a temp file and rename, so a crash leaves either the old or the new
/// snapshot on disk.
#[derive(Debug)]
pub struct FileDurableStore {
    path: PathBuf,
    index: Mutex<DurableIndex>,
    /// Serializes snapshot writes
    write_lock: tokio::sync::Mutex<()>,
}

impl FileDurableStore {
    // == Open ==
    /// Opens the snapshot at `path`, starting empty when it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DurableError> {
        let path = path.as_ref().to_path_buf();

        let entries: HashMap<String, StoredEntry> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = entries.len(), "Durable snapshot opened");

        Ok(Self {
            path,
            index: Mutex::new(DurableIndex::from_entries(entries)),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    // == Persist ==
    async fn persist(&self) -> Result<(), DurableError> {
        let _guard = self.write_lock.lock().await;

        // Snapshot taken under the write lock so the newest state wins
        let bytes = serde_json::to_vec(&lock(&self.index).entries)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Durable snapshot written");
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileDurableStore {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, DurableError> {
        Ok(lock(&self.index).entries.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: &StoredEntry) -> Result<(), DurableError> {
        lock(&self.index).insert(key.to_string(), entry.clone());
        self.persist().await
    }

    async fn delete(&self, key: &str) -> Result<bool, DurableError> {
        let removed = lock(&self.index).remove(key);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn keys_for_tag(&self, tag: &str) -> Result<Vec<String>, DurableError> {
        Ok(lock(&self.index).keys_for_tag(tag))
    }

    async fn entries(&self) -> Result<Vec<(String, StoredEntry)>, DurableError> {
        Ok(lock(&self.index)
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn clear(&self) -> Result<(), DurableError> {
        lock(&self.index).clear();
        self.persist().await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Priority;
    use serde_json::json;

    fn stored(data: Value, tags: &[&str]) -> StoredEntry {
        CacheEntry::new(
            data,
            60_000,
            tags.iter().map(|t| t.to_string()),
            Priority::Medium,
        )
    }

    #[tokio::test]
    async fn test_memory_store_tag_index() {
        let store = MemoryDurableStore::new();
        store.put("a", &stored(json!(1), &["t"])).await.unwrap();
        store.put("b", &stored(json!(2), &["t", "u"])).await.unwrap();
        store.put("c", &stored(json!(3), &[])).await.unwrap();

        let mut keys = store.keys_for_tag("t").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.delete("b").await.unwrap();
        assert_eq!(store.keys_for_tag("t").await.unwrap(), vec!["a".to_string()]);
        assert!(store.keys_for_tag("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_overwrite_reindexes_tags() {
        let store = MemoryDurableStore::new();
        store.put("a", &stored(json!(1), &["old"])).await.unwrap();
        store.put("a", &stored(json!(2), &["new"])).await.unwrap();

        assert!(store.keys_for_tag("old").await.unwrap().is_empty());
        assert_eq!(store.keys_for_tag("new").await.unwrap(), vec!["a".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let store = FileDurableStore::open(&path).await.unwrap();
            store.put("menu:r1", &stored(json!({"items": 3}), &["menu-r1"])).await.unwrap();
            store.put("orders:r1", &stored(json!([1, 2]), &["orders-r1"])).await.unwrap();
            store.delete("orders:r1").await.unwrap();
        }

        let reopened = FileDurableStore::open(&path).await.unwrap();
        let entry = reopened.get("menu:r1").await.unwrap().unwrap();
        assert_eq!(entry.data, json!({"items": 3}));
        assert!(reopened.get("orders:r1").await.unwrap().is_none());
        assert_eq!(
            reopened.keys_for_tag("menu-r1").await.unwrap(),
            vec!["menu:r1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = FileDurableStore::open(&path).await;
        assert!(matches!(result, Err(DurableError::Serde(_))));
    }
}
