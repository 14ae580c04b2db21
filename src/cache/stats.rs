//! Cache Statistics Module
//!
//! Tracks cache engine metrics: hits, misses, evictions, durable promotions
//! and tier sizes.

use serde::Serialize;

// == Cache Stats ==
/// Diagnostic snapshot of the cache engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Gets served from either tier
    pub hits: u64,
    /// Gets that found nothing valid
    pub misses: u64,
    /// Entries evicted from the memory tier
    pub evictions: u64,
    /// Durable hits promoted into memory
    pub promotions: u64,
    /// Durable-tier operations that failed and were degraded
    pub durable_faults: u64,
    /// Current number of entries in the memory tier
    pub total_entries: usize,
    /// Approximate serialized size of the memory tier in bytes
    pub memory_bytes: usize,
    /// Whether a durable tier is attached and reachable
    pub durable_available: bool,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_promotion(&mut self) {
        self.promotions += 1;
    }

    pub fn record_durable_fault(&mut self) {
        self.durable_faults += 1;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.total_entries, 0);
        assert!(!stats.durable_available);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_evictions() {
        let mut stats = CacheStats::new();
        stats.record_evictions(3);
        stats.record_evictions(2);
        assert_eq!(stats.evictions, 5);
    }
}
