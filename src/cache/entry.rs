//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, dependency
//! tags and eviction priority.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Priority ==
/// Eviction weight of an entry. Low entries go first at equal age.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric weight used for eviction ranking.
    pub fn weight(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

// == Cache Entry ==
/// Represents a single cache entry with payload and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload, opaque to the cache
    pub data: T,
    /// Last write or last access (Unix milliseconds)
    pub timestamp: u64,
    /// Validity window in milliseconds
    pub ttl_ms: u64,
    /// Dependency tags for tag-based invalidation
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Eviction weight
    #[serde(default)]
    pub priority: Priority,
    /// Tie-breaker for entries touched within the same millisecond
    #[serde(skip)]
    pub sequence: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// A zero TTL is bumped to one millisecond so the entry is valid for at
    /// least the instant it was written.
    pub fn new(data: T, ttl_ms: u64, tags: impl IntoIterator<Item = String>, priority: Priority) -> Self {
        Self {
            data,
            timestamp: current_timestamp_ms(),
            ttl_ms: ttl_ms.max(1),
            tags: tags.into_iter().collect(),
            priority,
            sequence: 0,
        }
    }

    // == Validity ==
    /// Checks the entry against a reference time.
    ///
    /// Boundary condition: the entry is stale once `now - timestamp >= ttl`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) < self.ttl_ms
    }

    /// Checks the entry against the current time.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(current_timestamp_ms())
    }

    /// Returns true when the entry carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Restamps the entry, used on write and on read hits.
    pub fn touch(&mut self, now: u64, sequence: u64) {
        self.timestamp = now;
        self.sequence = sequence;
    }

    // == Eviction Rank ==
    /// Ordering key for eviction: lowest ranks are evicted first.
    pub fn rank(&self) -> (u8, u64, u64) {
        (self.priority.weight(), self.timestamp, self.sequence)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
