//! Optimistic Mutation Coordinator
//!
//! Snapshot, patch, mutate remotely, roll back on failure, then reconcile
//! through the orchestrator whatever the outcome.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{MutationError, RemoteError};
use crate::mutation::{apply_status, is_order, OrderStatus};
use crate::orchestrator::InvalidationOrchestrator;
use crate::query::keys::orders;
use crate::query::{QueryCache, QueryKey};

// == Remote Boundary ==
/// Remote data-access for order mutations.
///
/// Transient failures are retried by the implementation, not by the
/// coordinator.
#[async_trait]
pub trait OrderRemote: Send + Sync {
    async fn update_order_status(
        &self,
        scope: &str,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Value, RemoteError>;
}

// == Mutation Coordinator ==
pub struct MutationCoordinator {
    queries: Arc<QueryCache>,
    orchestrator: Arc<InvalidationOrchestrator>,
    remote: Arc<dyn OrderRemote>,
}

impl MutationCoordinator {
    pub fn new(
        queries: Arc<QueryCache>,
        orchestrator: Arc<InvalidationOrchestrator>,
        remote: Arc<dyn OrderRemote>,
    ) -> Self {
        Self {
            queries,
            orchestrator,
            remote,
        }
    }

    // == Run ==
    /// Runs an optimistic mutation affecting orders of `scope`.
    ///
    /// # Arguments
    /// * `scope` - Scope whose order queries are reconciled on settle
    /// * `order_id` - Order whose detail key is reconciled, when known
    /// * `keys` - Query keys to snapshot and patch
    /// * `patch` - Speculative update applied to each cached key
    /// * `mutation` - The remote call
    ///
    /// On failure the snapshot is restored and the error returned with
    /// `rolled_back` set. The orders action runs in both cases.
    pub async fn run<P, M, Fut, T>(
        &self,
        scope: &str,
        order_id: Option<&str>,
        keys: Vec<QueryKey>,
        patch: P,
        mutation: M,
    ) -> Result<T, MutationError>
    where
        P: Fn(&QueryKey, &mut Value),
        M: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let snapshot = self.queries.snapshot(&keys);
        let mut patched = 0;
        for key in &keys {
            if self.queries.patch(key, |value| patch(key, value)) {
                patched += 1;
            }
        }
        debug!(scope, snapshot = snapshot.id(), patched, "Applied optimistic update");

        let outcome = match mutation().await {
            Ok(value) => Ok(value),
            Err(source) => {
                warn!(scope, error = %source, "Remote mutation failed, rolling back");
                let rolled_back = match self.queries.rollback(snapshot) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(scope, error = %e, "Rollback failed, keeping optimistic state until refetch");
                        false
                    }
                };
                Err(MutationError { source, rolled_back })
            }
        };

        self.orchestrator.reconcile_order(scope, order_id).await;
        outcome
    }

    // == Update Order Status ==
    /// Moves `order_id` to `status`, optimistically updating every cached
    /// order list of the scope and the order's detail if cached.
    pub async fn update_order_status(
        &self,
        scope: &str,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Value, MutationError> {
        let mut keys = self.queries.keys_with_prefix(&orders::lists(scope));
        let detail = orders::detail(scope, order_id);
        if self.queries.contains(&detail) {
            keys.push(detail);
        }

        let now = Utc::now();
        let remote = self.remote.clone();
        self.run(
            scope,
            Some(order_id),
            keys,
            |_, value| patch_order(value, order_id, status, now),
            || async move { remote.update_order_status(scope, order_id, status).await },
        )
        .await
    }
}

/// Patches a cached order list or a single cached order.
fn patch_order(value: &mut Value, order_id: &str, status: OrderStatus, now: chrono::DateTime<Utc>) {
    match value {
        Value::Array(list) => {
            for order in list.iter_mut().filter(|order| is_order(order, order_id)) {
                apply_status(order, status, now);
            }
        }
        order if is_order(order, order_id) => apply_status(order, status, now),
        _ => {}
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEngine;
    use crate::query::keys::analytics;
    use crate::query::QueryCacheEvent;
    use crate::realtime::{ChangeFanout, LocalTransport};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Remote that records the cached list it saw mid-flight.
    struct ScriptedRemote {
        queries: Arc<QueryCache>,
        fail_with: Option<RemoteError>,
        seen: Mutex<Option<Value>>,
    }

    #[async_trait]
    impl OrderRemote for ScriptedRemote {
        async fn update_order_status(
            &self,
            scope: &str,
            order_id: &str,
            status: OrderStatus,
        ) -> Result<Value, RemoteError> {
            *self.seen.lock().unwrap() = self.queries.get(&orders::list(scope, "all"));
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(json!({"id": order_id, "status": status})),
            }
        }
    }

    fn setup(fail_with: Option<RemoteError>) -> (MutationCoordinator, Arc<QueryCache>, Arc<ScriptedRemote>) {
        let queries = Arc::new(QueryCache::default());
        let fanout = Arc::new(ChangeFanout::new(Arc::new(LocalTransport::new())));
        let orchestrator = Arc::new(InvalidationOrchestrator::new(
            Arc::new(CacheEngine::default()),
            queries.clone(),
            fanout,
            Duration::from_millis(100),
        ));
        let remote = Arc::new(ScriptedRemote {
            queries: queries.clone(),
            fail_with,
            seen: Mutex::new(None),
        });
        let coordinator = MutationCoordinator::new(queries.clone(), orchestrator, remote.clone());
        (coordinator, queries, remote)
    }

    fn seed(queries: &QueryCache) {
        queries.set(
            orders::list("r1", "all"),
            json!([
                {"id": "o1", "status": "confirmed", "claimed_by": "u1"},
                {"id": "o2", "status": "pending"}
            ]),
        );
        queries.set(orders::detail("r1", "o1"), json!({"id": "o1", "status": "confirmed"}));
        queries.set(analytics::dashboard("r1"), json!({"served": 3}));
    }

    #[tokio::test]
    async fn test_success_patches_then_reconciles() {
        let (coordinator, queries, remote) = setup(None);
        seed(&queries);

        let result = coordinator
            .update_order_status("r1", "o1", OrderStatus::Ready)
            .await
            .unwrap();

        assert_eq!(result["status"], "ready");
        let seen = remote.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen[0]["status"], "ready");
        assert_eq!(seen[1]["status"], "pending");

        // Settled: order queries refetch, unrelated keys stay
        assert!(queries.get(&orders::list("r1", "all")).is_none());
        assert!(queries.get(&orders::detail("r1", "o1")).is_none());
        assert!(queries.get(&analytics::dashboard("r1")).is_some());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_before_reconcile() {
        let (coordinator, queries, remote) = setup(Some(RemoteError::Validation("illegal transition".into())));
        seed(&queries);
        let list = orders::list("r1", "all");
        let original = queries.get(&list).unwrap();
        let mut events = queries.subscribe();

        let err = coordinator
            .update_order_status("r1", "o1", OrderStatus::Pending)
            .await
            .unwrap_err();

        assert!(err.rolled_back);
        assert_eq!(err.source, RemoteError::Validation("illegal transition".into()));

        // Mid-flight the claim was released optimistically
        let seen = remote.seen.lock().unwrap().clone().unwrap();
        assert!(seen[0]["claimed_by"].is_null());

        // patch list, patch detail, rollback list, rollback detail, then reconcile
        let mut observed = Vec::new();
        while let Ok(event) = events.try_recv() {
            observed.push(event);
        }
        assert_eq!(
            &observed[..4],
            &[
                QueryCacheEvent::Updated(list.clone()),
                QueryCacheEvent::Updated(orders::detail("r1", "o1")),
                QueryCacheEvent::Updated(list.clone()),
                QueryCacheEvent::Updated(orders::detail("r1", "o1")),
            ]
        );
        assert!(observed[4..].contains(&QueryCacheEvent::Invalidated(list)));
        assert_ne!(seen, original);
    }

    #[tokio::test]
    async fn test_run_skips_uncached_keys() {
        let (coordinator, queries, _) = setup(None);
        let cached = orders::list("r9", "open");
        let missing = orders::list("r9", "closed");
        queries.set(cached.clone(), json!([{"id": 7, "status": "preparing"}]));

        let result: Result<(), MutationError> = coordinator
            .run(
                "r9",
                None,
                vec![cached.clone(), missing.clone()],
                |_, value| patch_order(value, "7", OrderStatus::Ready, Utc::now()),
                || async { Err(RemoteError::Transport("connection reset".into())) },
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.rolled_back);
        assert!(err.source.is_retryable());
        // Rollback never materializes a key that was absent at snapshot time
        assert!(!queries.contains(&missing));
        assert_eq!(queries.stats().patches, 1);
        assert_eq!(queries.stats().rollbacks, 1);
    }

    #[test]
    fn test_patch_order_list_and_detail() {
        let now = Utc::now();
        let mut list = json!([{"id": "o1", "status": "pending"}, {"id": "o2", "status": "pending"}]);
        patch_order(&mut list, "o2", OrderStatus::Confirmed, now);
        assert_eq!(list[0]["status"], "pending");
        assert_eq!(list[1]["status"], "confirmed");

        let mut detail = json!({"id": "o2", "status": "pending"});
        patch_order(&mut detail, "o2", OrderStatus::Served, now);
        assert_eq!(detail["status"], "served");

        let mut other = json!({"id": "o3", "status": "pending"});
        patch_order(&mut other, "o2", OrderStatus::Served, now);
        assert_eq!(other["status"], "pending");
    }
}
