//! Cache Module
//!
//! Two-tier cache engine with TTL expiration, priority-aware LRU eviction and
//! dependency-tag invalidation.

mod durable;
mod engine;
mod entry;
mod eviction;
mod stats;


// Re-export public types
pub use durable::{DurableStore, FileDurableStore, MemoryDurableStore, StoredEntry};
pub use engine::{CacheEngine, SetOptions, DEFAULT_CAPACITY, DEFAULT_TTL};
pub use entry::{current_timestamp_ms, CacheEntry, Priority};
pub use eviction::{select_victims, victim_count};
pub use stats::CacheStats;
