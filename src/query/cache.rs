//! Query Result Cache
//!
//! Derived query results keyed by `QueryKey`, with prefix invalidation,
//! in-place optimistic patches and snapshot/rollback. Observers follow
//! changes through `subscribe()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, CacheEntry, Priority};
use crate::error::RollbackError;
use crate::query::QueryKey;

/// Default time before a cached query result is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

const EVENT_BUFFER: usize = 256;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

// == Events ==
/// Change notifications for presentation-layer observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryCacheEvent {
    /// A key was written or patched
    Updated(QueryKey),
    /// A key was removed by invalidation
    Invalidated(QueryKey),
    /// Every key was dropped
    Cleared,
}

// == Invalidate Mode ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Match {
    /// Only the key itself
    Exact,
    /// The key and every key it prefixes
    #[default]
    Prefix,
}

// == Snapshot ==
/// Captured values for a set of keys, restorable with `rollback`.
///
/// Absent keys are captured as `None` and removed again on rollback.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    cache_id: u64,
    id: u64,
    entries: Vec<(QueryKey, Option<CacheEntry<Value>>)>,
}

impl QuerySnapshot {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// Captured value for `key`, if it was cached at snapshot time.
    pub fn value(&self, key: &QueryKey) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, entry)| entry.as_ref())
            .map(|entry| &entry.data)
    }
}

// == Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryCacheStats {
    pub entries: usize,
    pub invalidations: u64,
    pub patches: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
struct QueryTier {
    entries: HashMap<QueryKey, CacheEntry<Value>>,
    stats: QueryCacheStats,
    next_snapshot: u64,
}

// == Query Cache ==
pub struct QueryCache {
    id: u64,
    tier: Mutex<QueryTier>,
    events: broadcast::Sender<QueryCacheEvent>,
    stale_after: Duration,
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            tier: Mutex::new(QueryTier::default()),
            events,
            stale_after,
        }
    }

    fn tier(&self) -> MutexGuard<'_, QueryTier> {
        self.tier.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: QueryCacheEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Receives every update and invalidation from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryCacheEvent> {
        self.events.subscribe()
    }

    // == Get ==
    /// Returns the cached value, or None when absent or stale.
    ///
    /// A stale entry is removed on the way out.
    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        let mut tier = self.tier();
        match tier.entries.get(key) {
            Some(entry) if entry.is_valid() => Some(entry.data.clone()),
            Some(_) => {
                tier.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Typed variant of `get`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached query result does not match requested type");
                None
            }
        }
    }

    // == Set ==
    /// Stores a query result, overwriting any prior value.
    pub fn set(&self, key: QueryKey, data: Value) {
        let stale_after = u64::try_from(self.stale_after.as_millis()).unwrap_or(u64::MAX);
        let entry = CacheEntry::new(data, stale_after, Vec::new(), Priority::Medium);
        self.tier().entries.insert(key.clone(), entry);
        self.emit(QueryCacheEvent::Updated(key));
    }

    // == Invalidate ==
    /// Removes `key` (and with `Match::Prefix`, every key it prefixes).
    ///
    /// Returns the number of removed entries.
    pub fn invalidate(&self, key: &QueryKey, mode: Match) -> usize {
        let removed: Vec<QueryKey> = {
            let mut tier = self.tier();
            let removed: Vec<QueryKey> = match mode {
                Match::Exact => tier.entries.remove_entry(key).map(|(k, _)| k).into_iter().collect(),
                Match::Prefix => {
                    let keys: Vec<QueryKey> = tier
                        .entries
                        .keys()
                        .filter(|candidate| key.is_prefix_of(candidate))
                        .cloned()
                        .collect();
                    for k in &keys {
                        tier.entries.remove(k);
                    }
                    keys
                }
            };
            tier.stats.invalidations += removed.len() as u64;
            removed
        };

        if !removed.is_empty() {
            debug!(key = %key, ?mode, removed = removed.len(), "Invalidated query results");
        }
        let count = removed.len();
        for key in removed {
            self.emit(QueryCacheEvent::Invalidated(key));
        }
        count
    }

    pub fn invalidate_exact(&self, key: &QueryKey) -> usize {
        self.invalidate(key, Match::Exact)
    }

    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        self.invalidate(prefix, Match::Prefix)
    }

    /// True when `key` holds a valid entry.
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.tier().entries.get(key).is_some_and(|entry| entry.is_valid())
    }

    /// Cached keys under `prefix`, stale or not.
    pub fn keys_with_prefix(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .tier()
            .entries
            .keys()
            .filter(|key| prefix.is_prefix_of(key))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    // == Patch ==
    /// Applies `updater` to the cached value in place and restamps it fresh.
    ///
    /// Returns false, without calling `updater`, when nothing is cached.
    pub fn patch<F>(&self, key: &QueryKey, updater: F) -> bool
    where
        F: FnOnce(&mut Value),
    {
        {
            let mut guard = self.tier();
            let tier = &mut *guard;
            let Some(entry) = tier.entries.get_mut(key) else {
                return false;
            };
            updater(&mut entry.data);
            entry.timestamp = current_timestamp_ms();
            tier.stats.patches += 1;
        }
        self.emit(QueryCacheEvent::Updated(key.clone()));
        true
    }

    // == Snapshot ==
    /// Captures the current entries for `keys`.
    pub fn snapshot(&self, keys: &[QueryKey]) -> QuerySnapshot {
        let mut tier = self.tier();
        tier.next_snapshot += 1;
        let entries = keys
            .iter()
            .map(|key| (key.clone(), tier.entries.get(key).cloned()))
            .collect();
        QuerySnapshot {
            cache_id: self.id,
            id: tier.next_snapshot,
            entries,
        }
    }

    // == Rollback ==
    /// Restores every captured key verbatim, including its timestamp.
    pub fn rollback(&self, snapshot: QuerySnapshot) -> Result<(), RollbackError> {
        if snapshot.cache_id != self.id {
            return Err(RollbackError::ForeignSnapshot {
                snapshot: snapshot.id,
                cache: self.id,
            });
        }

        let mut events = Vec::with_capacity(snapshot.entries.len());
        {
            let mut tier = self.tier();
            for (key, entry) in snapshot.entries {
                match entry {
                    Some(entry) => {
                        tier.entries.insert(key.clone(), entry);
                        events.push(QueryCacheEvent::Updated(key));
                    }
                    None => {
                        if tier.entries.remove(&key).is_some() {
                            events.push(QueryCacheEvent::Invalidated(key));
                        }
                    }
                }
            }
            tier.stats.rollbacks += 1;
        }

        debug!(snapshot = snapshot.id, keys = events.len(), "Rolled back query results");
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    // == Sweep Expired ==
    /// Drops every stale result, including keys nobody reads again.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut tier = self.tier();
        let before = tier.entries.len();
        tier.entries.retain(|_, entry| entry.is_valid_at(now));
        before - tier.entries.len()
    }

    // == Clear ==
    pub fn clear(&self) {
        self.tier().entries.clear();
        self.emit(QueryCacheEvent::Cleared);
    }

    pub fn len(&self) -> usize {
        self.tier().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueryCacheStats {
        let tier = self.tier();
        let mut stats = tier.stats.clone();
        stats.entries = tier.entries.len();
        stats
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}
