//! Invalidation Orchestrator
//!
//! Subscribes to the change fan-out per scope and keeps both caches coherent
//! with the remote store. Event-driven invalidations are applied before the
//! listener returns; manual requests may go through the batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CacheEngine;
use crate::error::TransportError;
use crate::orchestrator::{plan_for, InvalidationBatch, InvalidationKind, InvalidationPlan};
use crate::query::QueryCache;
use crate::realtime::{ChangeEvent, ChangeFanout, ChangeListener, EntityClass, Subscription};

// == Scope State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeState {
    Uninitialized,
    Active,
    TornDown,
}

enum ScopeEntry {
    Active(Vec<Subscription>),
    TornDown,
}

// == Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestratorStats {
    /// Change events mapped to a plan and applied
    pub events_handled: u64,
    /// Change events for unrecognized tables
    pub events_ignored: u64,
    /// Immediate manual invalidations
    pub manual_invalidations: u64,
    /// Requests queued into a batch, duplicates included
    pub batched_requests: u64,
    /// Batches flushed
    pub batch_flushes: u64,
    /// Distinct actions applied by batch flushes
    pub batched_actions: u64,
    /// Scopes currently Active
    pub active_scopes: usize,
}

/// Outcome of applying one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub query_results: usize,
    pub engine_entries: usize,
}

// == Invalidator ==
/// Shared core reached by subscription listeners and batch timers.
struct Invalidator {
    engine: Arc<CacheEngine>,
    queries: Arc<QueryCache>,
    batch: Mutex<Option<InvalidationBatch>>,
    next_generation: AtomicU64,
    window: Duration,
    stats: Mutex<OrchestratorStats>,
}

impl Invalidator {
    fn stats(&self) -> MutexGuard<'_, OrchestratorStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn batch(&self) -> MutexGuard<'_, Option<InvalidationBatch>> {
        self.batch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Query-cache invalidation first, then engine tags.
    async fn apply(&self, plan: &InvalidationPlan) -> Applied {
        let mut applied = Applied::default();
        for (key, mode) in &plan.queries {
            applied.query_results += self.queries.invalidate(key, *mode);
        }
        for tag in &plan.tags {
            applied.engine_entries += self.engine.invalidate_by_tag(tag).await;
        }
        applied
    }

    async fn handle_event(&self, event: &ChangeEvent) -> Option<Applied> {
        let Some(plan) = plan_for(event) else {
            warn!(table = %event.entity_table, scope = %event.scope, "Unrecognized change, ignoring");
            self.stats().events_ignored += 1;
            return None;
        };

        let applied = self.apply(&plan).await;
        self.stats().events_handled += 1;
        debug!(
            table = %event.entity_table,
            kind = ?event.kind,
            scope = %event.scope,
            query_results = applied.query_results,
            engine_entries = applied.engine_entries,
            "Applied change invalidation"
        );
        Some(applied)
    }

    // == Batching ==
    fn queue(self: &Arc<Self>, kind: InvalidationKind, scope: &str) {
        let mut slot = self.batch();
        let batch = slot.get_or_insert_with(|| {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let core = Arc::clone(self);
            let window = self.window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                core.flush(Some(generation)).await;
            });
            InvalidationBatch::new(generation)
        });
        batch.push(kind, scope);
        drop(slot);

        self.stats().batched_requests += 1;
    }

    /// Flushes the pending batch. A timer passes its generation so it never
    /// flushes a batch created after the one it was armed for.
    async fn flush(&self, generation: Option<u64>) -> usize {
        let batch = {
            let mut slot = self.batch();
            let superseded = matches!(
                (slot.as_ref(), generation),
                (Some(batch), Some(g)) if batch.generation() != g
            );
            if superseded {
                return 0;
            }
            slot.take()
        };
        let Some(batch) = batch else {
            return 0;
        };

        let requests = batch.requests();
        let mut actions = 0;
        for (kind, scope) in batch.into_actions() {
            self.apply(&InvalidationPlan::for_kind(kind, &scope)).await;
            actions += 1;
        }

        {
            let mut stats = self.stats();
            stats.batch_flushes += 1;
            stats.batched_actions += actions as u64;
        }
        debug!(requests, actions, "Flushed invalidation batch");
        actions
    }
}

#[async_trait]
impl ChangeListener for Invalidator {
    async fn on_change(&self, event: ChangeEvent) -> anyhow::Result<()> {
        self.handle_event(&event).await;
        Ok(())
    }
}

// == Invalidation Orchestrator ==
/// Coordinates subscriptions and invalidations for every scope.
///
/// Construct once per process and share by reference.
pub struct InvalidationOrchestrator {
    core: Arc<Invalidator>,
    fanout: Arc<ChangeFanout>,
    scopes: tokio::sync::Mutex<HashMap<String, ScopeEntry>>,
}

impl InvalidationOrchestrator {
    // == Constructor ==
    /// # Arguments
    /// * `engine` - Cache engine whose tags are invalidated
    /// * `queries` - Query result cache whose keys are invalidated
    /// * `fanout` - Source of change subscriptions
    /// * `window` - Batch window for queued manual invalidations
    pub fn new(
        engine: Arc<CacheEngine>,
        queries: Arc<QueryCache>,
        fanout: Arc<ChangeFanout>,
        window: Duration,
    ) -> Self {
        Self {
            core: Arc::new(Invalidator {
                engine,
                queries,
                batch: Mutex::new(None),
                next_generation: AtomicU64::new(1),
                window,
                stats: Mutex::new(OrchestratorStats::default()),
            }),
            fanout,
            scopes: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.core.engine
    }

    pub fn queries(&self) -> &Arc<QueryCache> {
        &self.core.queries
    }

    // == Setup ==
    /// Opens the orders, menu and sessions subscriptions for `scope`.
    ///
    /// No-op when the scope is already Active. If any subscription fails to
    /// open, the ones already opened are torn down and the error returned.
    pub async fn setup(&self, scope: &str) -> Result<(), TransportError> {
        let mut scopes = self.scopes.lock().await;
        if matches!(scopes.get(scope), Some(ScopeEntry::Active(_))) {
            debug!(scope, "Scope already active");
            return Ok(());
        }

        let listener: Arc<dyn ChangeListener> = self.core.clone();
        let mut subscriptions = Vec::with_capacity(EntityClass::ALL.len());
        for class in EntityClass::ALL {
            match self.fanout.subscribe(scope, class, listener.clone()).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    warn!(scope, %class, error = %e, "Subscription failed, rolling back setup");
                    for subscription in &subscriptions {
                        subscription.teardown().await;
                    }
                    return Err(e);
                }
            }
        }

        scopes.insert(scope.to_string(), ScopeEntry::Active(subscriptions));
        info!(scope, "Invalidation orchestrator active for scope");
        Ok(())
    }

    // == Teardown ==
    /// Tears down every subscription of `scope`. Returns false if it was not
    /// Active.
    pub async fn teardown_scope(&self, scope: &str) -> bool {
        let mut scopes = self.scopes.lock().await;
        let Some(ScopeEntry::Active(_)) = scopes.get(scope) else {
            return false;
        };

        if let Some(ScopeEntry::Active(subscriptions)) = scopes.insert(scope.to_string(), ScopeEntry::TornDown) {
            for subscription in &subscriptions {
                subscription.teardown().await;
            }
        }
        info!(scope, "Scope torn down");
        true
    }

    /// Tears down every Active scope and flushes any pending batch.
    pub async fn cleanup(&self) {
        let mut scopes = self.scopes.lock().await;
        for (scope, entry) in scopes.iter_mut() {
            if let ScopeEntry::Active(subscriptions) = std::mem::replace(entry, ScopeEntry::TornDown) {
                for subscription in &subscriptions {
                    subscription.teardown().await;
                }
                debug!(scope = %scope, "Scope torn down during cleanup");
            }
        }
        drop(scopes);

        self.core.flush(None).await;
        info!("Invalidation orchestrator cleaned up");
    }

    pub async fn scope_state(&self, scope: &str) -> ScopeState {
        match self.scopes.lock().await.get(scope) {
            None => ScopeState::Uninitialized,
            Some(ScopeEntry::Active(_)) => ScopeState::Active,
            Some(ScopeEntry::TornDown) => ScopeState::TornDown,
        }
    }

    // == Event Path ==
    /// Classifies and applies one change event. Returns None when the table
    /// is not recognized.
    pub async fn handle_event(&self, event: &ChangeEvent) -> Option<Applied> {
        self.core.handle_event(event).await
    }

    // == Manual Entry Points ==
    /// Applies the plan for `kind` immediately, on both caches.
    pub async fn invalidate(&self, kind: InvalidationKind, scope: &str) -> Applied {
        let applied = self.core.apply(&InvalidationPlan::for_kind(kind, scope)).await;
        self.core.stats().manual_invalidations += 1;
        debug!(%kind, scope, "Manual invalidation");
        applied
    }

    pub async fn invalidate_all_for_scope(&self, scope: &str) -> Applied {
        self.invalidate(InvalidationKind::All, scope).await
    }

    pub async fn invalidate_orders(&self, scope: &str) -> Applied {
        self.invalidate(InvalidationKind::Orders, scope).await
    }

    pub async fn invalidate_menu(&self, scope: &str) -> Applied {
        self.invalidate(InvalidationKind::Menu, scope).await
    }

    pub async fn invalidate_analytics(&self, scope: &str) -> Applied {
        self.invalidate(InvalidationKind::Analytics, scope).await
    }

    pub async fn invalidate_sessions(&self, scope: &str) -> Applied {
        self.invalidate(InvalidationKind::Sessions, scope).await
    }

    pub async fn invalidate_restaurant(&self, scope: &str) -> Applied {
        self.invalidate(InvalidationKind::Restaurant, scope).await
    }

    /// Runs the event-path orders action for one order.
    pub async fn reconcile_order(&self, scope: &str, order_id: Option<&str>) -> Applied {
        self.core.apply(&InvalidationPlan::orders(scope, order_id)).await
    }

    // == Batched Path ==
    /// Queues `(kind, scope)` into the current batch.
    ///
    /// The batch flushes on its own after the window; repeated pairs collapse
    /// into one action. Must be called within a Tokio runtime.
    pub fn queue_invalidation(&self, kind: InvalidationKind, scope: &str) {
        self.core.queue(kind, scope);
    }

    /// Flushes the pending batch now. Returns the number of distinct actions.
    pub async fn flush(&self) -> usize {
        self.core.flush(None).await
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let active = self
            .scopes
            .lock()
            .await
            .values()
            .filter(|entry| matches!(entry, ScopeEntry::Active(_)))
            .count();
        let mut stats = self.core.stats().clone();
        stats.active_scopes = active;
        stats
    }
}
