//! Cache Engine Module
//!
//! Two-tier cache: a bounded in-memory map in front of an optional durable
//! mirror, with TTL validity, priority-aware LRU eviction and dependency-tag
//! invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::durable::{DurableStore, StoredEntry};
use crate::cache::eviction::select_victims;
use crate::cache::{current_timestamp_ms, CacheEntry, CacheStats, Priority};
use crate::error::DurableError;

/// Default in-memory tier capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default entry TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

// == Set Options ==
/// Per-write options for `CacheEngine::set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL override, engine default when None
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub priority: Priority,
    /// Write only to the durable tier
    pub skip_memory: bool,
    /// Write only to the memory tier
    pub skip_durable: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn skip_memory(mut self) -> Self {
        self.skip_memory = true;
        self
    }

    pub fn skip_durable(mut self) -> Self {
        self.skip_durable = true;
        self
    }
}

// == Memory Tier ==
#[derive(Debug, Default)]
struct MemoryTier {
    entries: HashMap<String, StoredEntry>,
    stats: CacheStats,
    /// Monotonic touch counter, breaks same-millisecond LRU ties
    sequence: u64,
    /// Bumped by every write and invalidation. A durable read only promotes
    /// its copy if no bump happened while it was in flight.
    epoch: u64,
}

impl MemoryTier {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Inserts a freshly stamped entry and evicts if over capacity.
    fn insert(&mut self, key: String, mut entry: StoredEntry, capacity: usize) {
        let sequence = self.next_sequence();
        entry.touch(current_timestamp_ms(), sequence);
        self.entries.insert(key, entry);

        let victims = select_victims(&self.entries, capacity);
        if !victims.is_empty() {
            for victim in &victims {
                self.entries.remove(victim);
            }
            self.stats.record_evictions(victims.len());
            debug!(evicted = victims.len(), remaining = self.entries.len(), "Memory tier eviction");
        }
    }
}

// == Cache Engine ==
/// Owns the in-memory tier and an optional durable mirror.
///
/// Memory-tier operations never fail. Durable-tier faults are logged and
/// degrade that single operation to memory-only.
pub struct CacheEngine {
    memory: Mutex<MemoryTier>,
    durable: Option<Arc<dyn DurableStore>>,
    capacity: usize,
    default_ttl: Duration,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates a memory-only engine.
    ///
    /// # Arguments
    /// * `capacity` - Entries held in memory before eviction (minimum 1)
    /// * `default_ttl` - TTL for writes without an explicit one
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::default()),
            durable: None,
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    /// Creates an engine mirrored to `durable`.
    pub fn with_durable(capacity: usize, default_ttl: Duration, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            durable: Some(durable),
            ..Self::new(capacity, default_ttl)
        }
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Converts a TTL to whole milliseconds, saturating on overflow.
    fn ttl_ms(ttl: Duration) -> u64 {
        u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
    }

    fn durable_fault(&self, operation: &str, key: &str, error: DurableError) {
        warn!(operation, key, error = %error, "Durable tier fault, continuing memory-only");
        self.memory().stats.record_durable_fault();
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Checks memory first, then the durable tier. A valid durable entry is
    /// promoted into memory. Stale entries found on the way are removed from
    /// the tier they were found in. A hit refreshes the entry's timestamp.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = match self.get_value(key).await {
            Some(data) => data,
            None => return None,
        };

        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Cached payload does not match requested type");
                None
            }
        }
    }

    /// Untyped variant of `get`.
    ///
    /// A durable copy is not promoted when a write or invalidation ran while
    /// the durable read was in flight; the value is still returned.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        let now = current_timestamp_ms();

        let epoch = {
            let mut guard = self.memory();
            let memory = &mut *guard;
            let sequence = memory.next_sequence();
            match memory.entries.get_mut(key) {
                Some(entry) if entry.is_valid_at(now) => {
                    entry.touch(now, sequence);
                    let data = entry.data.clone();
                    memory.stats.record_hit();
                    return Some(data);
                }
                Some(_) => {
                    memory.entries.remove(key);
                }
                None => {}
            }
            memory.epoch
        };

        if let Some(durable) = &self.durable {
            match durable.get(key).await {
                Ok(Some(entry)) if entry.is_valid_at(now) => {
                    let data = entry.data.clone();
                    let mut memory = self.memory();
                    memory.stats.record_hit();
                    if memory.epoch == epoch {
                        memory.insert(key.to_string(), entry, self.capacity);
                        memory.stats.record_promotion();
                    } else {
                        debug!(key, "Cache changed during durable read, skipping promotion");
                    }
                    return Some(data);
                }
                Ok(Some(_)) => {
                    // A concurrent write may have replaced the stale copy
                    let unchanged = self.memory().epoch == epoch;
                    if unchanged {
                        if let Err(e) = durable.delete(key).await {
                            self.durable_fault("delete", key, e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => self.durable_fault("get", key, e),
            }
        }

        self.memory().stats.record_miss();
        None
    }

    // == Set ==
    /// Stores a value, overwriting any prior entry for `key`.
    ///
    /// Writes the memory tier and/or the durable tier per `options`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, options: SetOptions) {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                warn!(key, error = %e, "Value is not serializable, skipping cache write");
                return;
            }
        };
        self.set_value(key, data, options).await;
    }

    /// Untyped variant of `set`.
    pub async fn set_value(&self, key: &str, data: Value, options: SetOptions) {
        let ttl = options.ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(data, Self::ttl_ms(ttl), options.tags, options.priority);

        // A tier that is skipped drops its older copy so it cannot shadow this write
        {
            let mut memory = self.memory();
            memory.bump_epoch();
            if options.skip_memory {
                memory.entries.remove(key);
            } else {
                memory.insert(key.to_string(), entry.clone(), self.capacity);
            }
        }

        if let Some(durable) = &self.durable {
            let result = if options.skip_durable {
                durable.delete(key).await.map(|_| ())
            } else {
                durable.put(key, &entry).await
            };
            if let Err(e) = result {
                self.durable_fault(if options.skip_durable { "delete" } else { "put" }, key, e);
            }
        }

        self.memory().bump_epoch();
    }

    // == Invalidate ==
    /// Removes `key` from both tiers, then invalidates every entry tagged
    /// with `key`.
    pub async fn invalidate(&self, key: &str) {
        {
            let mut memory = self.memory();
            memory.bump_epoch();
            memory.entries.remove(key);
        }

        if let Some(durable) = &self.durable {
            if let Err(e) = durable.delete(key).await {
                self.durable_fault("delete", key, e);
            }
            self.memory().bump_epoch();
        }

        self.invalidate_by_tag(key).await;
    }

    // == Invalidate By Tag ==
    /// Removes every entry in either tier whose tags contain `tag`.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut removed = {
            let mut memory = self.memory();
            memory.bump_epoch();
            let before = memory.entries.len();
            memory.entries.retain(|_, entry| !entry.has_tag(tag));
            before - memory.entries.len()
        };

        if let Some(durable) = &self.durable {
            match durable.keys_for_tag(tag).await {
                Ok(keys) => {
                    for key in keys {
                        match durable.delete(&key).await {
                            Ok(true) => removed += 1,
                            Ok(false) => {}
                            Err(e) => self.durable_fault("delete", &key, e),
                        }
                    }
                }
                Err(e) => self.durable_fault("keys_for_tag", tag, e),
            }
            // Reads that started before the durable deletes finished must not promote
            self.memory().bump_epoch();
        }

        if removed > 0 {
            debug!(tag, removed, "Invalidated entries by tag");
        }
        removed
    }

    // == Clear ==
    /// Empties both tiers unconditionally.
    pub async fn clear(&self) {
        {
            let mut memory = self.memory();
            memory.bump_epoch();
            memory.entries.clear();
        }

        if let Some(durable) = &self.durable {
            if let Err(e) = durable.clear().await {
                self.durable_fault("clear", "*", e);
            }
            self.memory().bump_epoch();
        }
    }

    // == Sweep Expired ==
    /// Removes every entry, in either tier, that fails the TTL check.
    ///
    /// Returns the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = current_timestamp_ms();

        let mut removed = {
            let mut memory = self.memory();
            let before = memory.entries.len();
            memory.entries.retain(|_, entry| entry.is_valid_at(now));
            before - memory.entries.len()
        };

        if let Some(durable) = &self.durable {
            match durable.entries().await {
                Ok(entries) => {
                    for (key, entry) in entries {
                        if entry.is_valid_at(now) {
                            continue;
                        }
                        match durable.delete(&key).await {
                            Ok(true) => removed += 1,
                            Ok(false) => {}
                            Err(e) => self.durable_fault("delete", &key, e),
                        }
                    }
                }
                Err(e) => self.durable_fault("scan", "*", e),
            }
        }

        removed
    }

    // == Stats ==
    /// Returns a diagnostic snapshot. No side effects.
    pub fn stats(&self) -> CacheStats {
        let memory = self.memory();
        let mut stats = memory.stats.clone();
        stats.total_entries = memory.entries.len();
        stats.memory_bytes = memory
            .entries
            .iter()
            .map(|(key, entry)| key.len() + serde_json::to_vec(&entry.data).map(|v| v.len()).unwrap_or(0))
            .sum();
        stats.durable_available = self.durable.as_ref().is_some_and(|d| d.is_available());
        stats
    }

    /// Returns true when `key` is held in the memory tier, valid or not.
    pub fn in_memory(&self, key: &str) -> bool {
        self.memory().entries.contains_key(key)
    }

    /// Current number of entries in the memory tier.
    pub fn len(&self) -> usize {
        self.memory().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ranks of the entries currently in memory, for diagnostics and tests.
    pub fn memory_ranks(&self) -> HashMap<String, (u8, u64, u64)> {
        self.memory()
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.rank()))
            .collect()
    }
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryDurableStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Durable tier that fails every operation.
    struct BrokenStore;

    #[async_trait]
    impl DurableStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<StoredEntry>, DurableError> {
            Err(DurableError::Unavailable("offline".into()))
        }
        async fn put(&self, _key: &str, _entry: &StoredEntry) -> Result<(), DurableError> {
            Err(DurableError::Unavailable("offline".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, DurableError> {
            Err(DurableError::Unavailable("offline".into()))
        }
        async fn keys_for_tag(&self, _tag: &str) -> Result<Vec<String>, DurableError> {
            Err(DurableError::Unavailable("offline".into()))
        }
        async fn entries(&self) -> Result<Vec<(String, StoredEntry)>, DurableError> {
            Err(DurableError::Unavailable("offline".into()))
        }
        async fn clear(&self) -> Result<(), DurableError> {
            Err(DurableError::Unavailable("offline".into()))
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    /// Durable tier whose next `get` reads its value, then parks until
    /// released.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryDurableStore,
        park_next_get: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DurableStore for SlowStore {
        async fn get(&self, key: &str) -> Result<Option<StoredEntry>, DurableError> {
            let entry = self.inner.get(key).await;
            if self.park_next_get.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            entry
        }
        async fn put(&self, key: &str, entry: &StoredEntry) -> Result<(), DurableError> {
            self.inner.put(key, entry).await
        }
        async fn delete(&self, key: &str) -> Result<bool, DurableError> {
            self.inner.delete(key).await
        }
        async fn keys_for_tag(&self, tag: &str) -> Result<Vec<String>, DurableError> {
            self.inner.keys_for_tag(tag).await
        }
        async fn entries(&self) -> Result<Vec<(String, StoredEntry)>, DurableError> {
            self.inner.entries().await
        }
        async fn clear(&self) -> Result<(), DurableError> {
            self.inner.clear().await
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    /// Starts a `get_value` that parks inside the durable read.
    async fn parked_read(
        engine: &Arc<CacheEngine>,
        store: &SlowStore,
        key: &'static str,
    ) -> tokio::task::JoinHandle<Option<Value>> {
        store.park_next_get.store(true, Ordering::SeqCst);
        let reader = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.get_value(key).await })
        };
        store.parked.notified().await;
        reader
    }

    fn engine_with_durable(capacity: usize) -> (CacheEngine, Arc<MemoryDurableStore>) {
        let durable = Arc::new(MemoryDurableStore::new());
        let engine = CacheEngine::with_durable(capacity, DEFAULT_TTL, durable.clone());
        (engine, durable)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let engine = CacheEngine::default();

        engine.set("orders:r1", &vec![1, 2, 3], SetOptions::new()).await;
        let value: Option<Vec<u32>> = engine.get("orders:r1").await;

        assert_eq!(value, Some(vec![1, 2, 3]));
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let engine = CacheEngine::default();
        assert_eq!(engine.get_value("nope").await, None);
        assert_eq!(engine.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let engine = CacheEngine::default();

        engine.set("k", "v1", SetOptions::new()).await;
        engine.set("k", "v2", SetOptions::new()).await;

        assert_eq!(engine.get::<String>("k").await.as_deref(), Some("v2"));
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_removes_from_both_tiers() {
        let (engine, durable) = engine_with_durable(10);

        engine
            .set("k", "v", SetOptions::new().ttl(Duration::from_millis(50)))
            .await;
        assert!(engine.get_value("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(engine.get_value("k").await.is_none());
        assert!(!engine.in_memory("k"));
        assert!(durable.is_empty());
    }

    #[tokio::test]
    async fn test_durable_hit_promotes_into_memory() {
        let (engine, _durable) = engine_with_durable(10);

        engine.set("k", &json!({"a": 1}), SetOptions::new().skip_memory()).await;
        assert!(!engine.in_memory("k"));

        assert_eq!(engine.get_value("k").await, Some(json!({"a": 1})));
        assert!(engine.in_memory("k"));
        assert_eq!(engine.stats().promotions, 1);
    }

    #[tokio::test]
    async fn test_skip_durable() {
        let (engine, durable) = engine_with_durable(10);

        engine.set("k", "v", SetOptions::new().skip_durable()).await;
        assert!(engine.in_memory("k"));
        assert!(durable.is_empty());
    }

    #[tokio::test]
    async fn test_skip_memory_write_replaces_memory_copy() {
        let (engine, _durable) = engine_with_durable(10);

        engine.set("k", "old", SetOptions::new()).await;
        engine.set("k", "new", SetOptions::new().skip_memory()).await;

        assert!(!engine.in_memory("k"));
        assert_eq!(engine.get_value("k").await, Some(json!("new")));
    }

    #[tokio::test]
    async fn test_skip_durable_write_drops_durable_copy() {
        let (engine, durable) = engine_with_durable(10);

        engine.set("k", "old", SetOptions::new()).await;
        engine.set("k", "new", SetOptions::new().skip_durable()).await;

        assert!(durable.is_empty());
        assert_eq!(engine.get_value("k").await, Some(json!("new")));
    }

    #[tokio::test]
    async fn test_invalidation_during_durable_read_is_not_undone() {
        let store = Arc::new(SlowStore::default());
        let engine = Arc::new(CacheEngine::with_durable(10, DEFAULT_TTL, store.clone()));
        engine
            .set_value("k", json!("v0"), SetOptions::new().tag("orders-r1").skip_memory())
            .await;

        let reader = parked_read(&engine, &store, "k").await;
        assert_eq!(engine.invalidate_by_tag("orders-r1").await, 1);
        store.release.notify_one();

        // The in-flight read saw the value before the invalidation
        assert_eq!(reader.await.unwrap(), Some(json!("v0")));
        assert!(!engine.in_memory("k"));
        assert_eq!(engine.get_value("k").await, None);
        assert_eq!(engine.stats().promotions, 0);
    }

    #[tokio::test]
    async fn test_clear_during_durable_read_is_not_undone() {
        let store = Arc::new(SlowStore::default());
        let engine = Arc::new(CacheEngine::with_durable(10, DEFAULT_TTL, store.clone()));
        engine.set_value("k", json!("v0"), SetOptions::new().skip_memory()).await;

        let reader = parked_read(&engine, &store, "k").await;
        engine.clear().await;
        store.release.notify_one();
        reader.await.unwrap();

        assert!(engine.is_empty());
        assert_eq!(engine.get_value("k").await, None);
    }

    #[tokio::test]
    async fn test_newer_write_wins_over_in_flight_promotion() {
        let store = Arc::new(SlowStore::default());
        let engine = Arc::new(CacheEngine::with_durable(10, DEFAULT_TTL, store.clone()));
        engine.set_value("k", json!("v0"), SetOptions::new().skip_memory()).await;

        let reader = parked_read(&engine, &store, "k").await;
        engine.set_value("k", json!("v1"), SetOptions::new()).await;
        store.release.notify_one();
        reader.await.unwrap();

        assert_eq!(engine.get_value("k").await, Some(json!("v1")));
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_wrap() {
        let engine = CacheEngine::default();
        engine
            .set("k", "v", SetOptions::new().ttl(Duration::from_secs(u64::MAX)))
            .await;

        assert_eq!(engine.get_value("k").await, Some(json!("v")));
    }

    #[tokio::test]
    async fn test_invalidate_by_tag_scans_both_tiers() {
        let (engine, durable) = engine_with_durable(10);

        engine.set("k1", "a", SetOptions::new().tag("t")).await;
        engine.set("k2", "b", SetOptions::new().tag("t").skip_memory()).await;
        engine.set("k3", "c", SetOptions::new().tag("other")).await;

        let removed = engine.invalidate_by_tag("t").await;

        // k1 counted in memory and durable, k2 in durable only
        assert_eq!(removed, 3);
        assert!(engine.get_value("k1").await.is_none());
        assert!(engine.get_value("k2").await.is_none());
        assert!(engine.get_value("k3").await.is_some());
        assert_eq!(durable.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_cascades_to_dependents() {
        let engine = CacheEngine::default();

        engine.set("orders:r1", "list", SetOptions::new()).await;
        engine.set("orders:r1:summary", "sum", SetOptions::new().tag("orders:r1")).await;
        engine.set("menu:r1", "menu", SetOptions::new()).await;

        engine.invalidate("orders:r1").await;

        assert!(engine.get_value("orders:r1").await.is_none());
        assert!(engine.get_value("orders:r1:summary").await.is_none());
        assert!(engine.get_value("menu:r1").await.is_some());
    }

    #[tokio::test]
    async fn test_eviction_keeps_capacity_and_high_priority() {
        let engine = CacheEngine::new(10, DEFAULT_TTL);

        engine
            .set("pinned", "p", SetOptions::new().priority(Priority::High))
            .await;
        for i in 0..20 {
            engine
                .set(&format!("low{}", i), &i, SetOptions::new().priority(Priority::Low))
                .await;
            assert!(engine.len() <= 10);
        }

        assert!(engine.in_memory("pinned"));
        assert!(engine.stats().evictions >= 10);
    }

    #[tokio::test]
    async fn test_get_refreshes_lru_position() {
        let engine = CacheEngine::new(3, DEFAULT_TTL);

        engine.set("a", "1", SetOptions::new()).await;
        engine.set("b", "2", SetOptions::new()).await;
        engine.set("c", "3", SetOptions::new()).await;

        // Touch a so b becomes the oldest
        engine.get_value("a").await;
        engine.set("d", "4", SetOptions::new()).await;

        assert!(engine.in_memory("a"));
        assert!(!engine.in_memory("b"));
    }

    #[tokio::test]
    async fn test_clear() {
        let (engine, durable) = engine_with_durable(10);
        engine.set("a", "1", SetOptions::new()).await;
        engine.set("b", "2", SetOptions::new()).await;

        engine.clear().await;

        assert!(engine.is_empty());
        assert!(durable.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let (engine, durable) = engine_with_durable(10);

        engine
            .set("short", "v", SetOptions::new().ttl(Duration::from_millis(30)))
            .await;
        engine
            .set("short_durable", "v", SetOptions::new().ttl(Duration::from_millis(30)).skip_memory())
            .await;
        engine.set("long", "v", SetOptions::new()).await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        // short in both tiers, short_durable in durable only
        assert_eq!(engine.sweep_expired().await, 3);
        assert_eq!(engine.len(), 1);
        assert_eq!(durable.len(), 1);
    }

    #[tokio::test]
    async fn test_durable_faults_degrade_to_memory() {
        let engine = CacheEngine::with_durable(10, DEFAULT_TTL, Arc::new(BrokenStore));

        engine.set("k", "v", SetOptions::new().tag("t")).await;
        assert_eq!(engine.get::<String>("k").await.as_deref(), Some("v"));
        assert!(engine.get_value("missing").await.is_none());
        assert_eq!(engine.invalidate_by_tag("t").await, 1);
        engine.clear().await;
        engine.sweep_expired().await;

        let stats = engine.stats();
        assert!(!stats.durable_available);
        assert!(stats.durable_faults >= 5);
    }

    #[tokio::test]
    async fn test_stats_reports_memory_size() {
        let engine = CacheEngine::default();
        engine.set("key", "value", SetOptions::new()).await;

        let stats = engine.stats();
        assert_eq!(stats.total_entries, 1);
        // "key" + "\"value\""
        assert_eq!(stats.memory_bytes, 3 + 7);
        assert!(!stats.durable_available);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let engine = CacheEngine::default();
        engine.set("k", "text", SetOptions::new()).await;

        let value: Option<u64> = engine.get("k").await;
        assert!(value.is_none());
    }
}
