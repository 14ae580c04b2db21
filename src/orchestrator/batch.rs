//! Invalidation Batch
//!
//! Time-windowed accumulator coalescing repeated manual requests.

use std::collections::BTreeSet;

use crate::orchestrator::InvalidationKind;

/// Default window between the first queued request and the automatic flush.
pub const DEFAULT_BATCH_WINDOW_MS: u64 = 100;

// == Invalidation Batch ==
/// Pending `(kind, scope)` pairs. Duplicates collapse to one.
///
/// Pairs are kept structured, so scopes containing any delimiter group
/// correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationBatch {
    generation: u64,
    pending: BTreeSet<(InvalidationKind, String)>,
    requests: u64,
}

impl InvalidationBatch {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            pending: BTreeSet::new(),
            requests: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Adds a request. Returns true when the pair was not already pending.
    pub fn push(&mut self, kind: InvalidationKind, scope: &str) -> bool {
        self.requests += 1;
        self.pending.insert((kind, scope.to_string()))
    }

    /// Number of requests queued, duplicates included.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Consumes the batch, yielding each distinct pair once in stable order.
    pub fn into_actions(self) -> impl Iterator<Item = (InvalidationKind, String)> {
        self.pending.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let mut batch = InvalidationBatch::new(1);
        for _ in 0..5 {
            batch.push(InvalidationKind::Orders, "r1");
        }
        batch.push(InvalidationKind::Menu, "r1");
        batch.push(InvalidationKind::Orders, "r2");

        assert_eq!(batch.requests(), 7);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_delimiter_in_scope_stays_structured() {
        let mut batch = InvalidationBatch::new(1);
        assert!(batch.push(InvalidationKind::Orders, "r1:east"));
        assert!(batch.push(InvalidationKind::Orders, "r1"));

        let actions: Vec<_> = batch.into_actions().collect();
        assert_eq!(
            actions,
            vec![
                (InvalidationKind::Orders, "r1".to_string()),
                (InvalidationKind::Orders, "r1:east".to_string()),
            ]
        );
    }
}
