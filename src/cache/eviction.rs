//! Eviction Module
//!
//! Priority-aware LRU victim selection for the in-memory tier.

use std::collections::HashMap;

use crate::cache::CacheEntry;

/// Share of the tier evicted per pass, in percent.
pub const EVICTION_PERCENT: usize = 10;

// == Victim Count ==
/// Number of entries evicted from a tier holding `len` entries.
///
/// 10% rounded up, never less than one.
pub fn victim_count(len: usize) -> usize {
    len.div_ceil(100 / EVICTION_PERCENT).max(1)
}

// == Select Victims ==
/// Picks the keys to evict once `entries` exceeds `capacity`.
///
/// Entries are ranked by `(priority weight, timestamp, sequence)` ascending,
/// so old low-priority entries go first. Returns an empty list while the tier
/// is within capacity.
pub fn select_victims<T>(entries: &HashMap<String, CacheEntry<T>>, capacity: usize) -> Vec<String> {
    if entries.len() <= capacity {
        return Vec::new();
    }

    let mut ranked: Vec<(&String, (u8, u64, u64))> =
        entries.iter().map(|(key, entry)| (key, entry.rank())).collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    // Evict at least down to capacity even if 10% would not get there
    let count = victim_count(entries.len()).max(entries.len() - capacity);

    ranked
        .into_iter()
        .take(count)
        .map(|(key, _)| key.clone())
        .collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Priority;

    fn entry(priority: Priority, timestamp: u64, sequence: u64) -> CacheEntry<()> {
        let mut entry = CacheEntry::new((), 60_000, Vec::new(), priority);
        entry.touch(timestamp, sequence);
        entry
    }

    #[test]
    fn test_victim_count_rounding() {
        assert_eq!(victim_count(1), 1);
        assert_eq!(victim_count(9), 1);
        assert_eq!(victim_count(10), 1);
        assert_eq!(victim_count(11), 2);
        assert_eq!(victim_count(101), 11);
    }

    #[test]
    fn test_no_victims_within_capacity() {
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), entry(Priority::Low, 1, 1));
        assert!(select_victims(&entries, 1).is_empty());
    }

    #[test]
    fn test_low_priority_evicted_before_older_high() {
        let mut entries = HashMap::new();
        entries.insert("old_high".to_string(), entry(Priority::High, 1, 1));
        entries.insert("new_low".to_string(), entry(Priority::Low, 5, 2));
        entries.insert("mid".to_string(), entry(Priority::Medium, 3, 3));

        assert_eq!(select_victims(&entries, 2), vec!["new_low".to_string()]);
    }

    #[test]
    fn test_oldest_evicted_at_equal_priority() {
        let mut entries = HashMap::new();
        for i in 0..11u64 {
            entries.insert(format!("k{}", i), entry(Priority::Medium, 100 + i, i));
        }

        let victims = select_victims(&entries, 10);
        assert_eq!(victims, vec!["k0".to_string(), "k1".to_string()]);
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let mut entries = HashMap::new();
        entries.insert("second".to_string(), entry(Priority::Medium, 7, 2));
        entries.insert("first".to_string(), entry(Priority::Medium, 7, 1));

        assert_eq!(select_victims(&entries, 1), vec!["first".to_string()]);
    }
}
