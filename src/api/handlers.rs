//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, warn};

use crate::cache::{CacheEngine, DurableStore, FileDurableStore, MemoryDurableStore};
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    ChangeRequest, ChangeResponse, HealthResponse, InvalidateRequest, InvalidateResponse, ScopeResponse,
    StatsResponse,
};
use crate::orchestrator::InvalidationOrchestrator;
use crate::query::QueryCache;
use crate::realtime::{ChangeFanout, LocalTransport};

/// Application state shared across all handlers.
///
/// Every component is internally synchronized, so clones share one cache.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CacheEngine>,
    pub queries: Arc<QueryCache>,
    pub transport: Arc<LocalTransport>,
    pub orchestrator: Arc<InvalidationOrchestrator>,
}

impl AppState {
    /// Wires the query cache, transport, fan-out and orchestrator around
    /// `engine`.
    pub fn new(engine: CacheEngine, batch_window: Duration) -> Self {
        let engine = Arc::new(engine);
        let queries = Arc::new(QueryCache::default());
        let transport = Arc::new(LocalTransport::new());
        let fanout = Arc::new(ChangeFanout::new(transport.clone()));
        let orchestrator = Arc::new(InvalidationOrchestrator::new(
            engine.clone(),
            queries.clone(),
            fanout,
            batch_window,
        ));

        Self {
            engine,
            queries,
            transport,
            orchestrator,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// A durable snapshot file that cannot be opened leaves the engine
    /// memory-only rather than failing startup.
    pub async fn from_config(config: &Config) -> Self {
        let durable: Option<Arc<dyn DurableStore>> = match &config.durable_path {
            Some(path) => match FileDurableStore::open(path).await {
                Ok(store) => {
                    info!(path = %path.display(), "Durable tier opened");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Durable tier unavailable, running memory-only");
                    None
                }
            },
            None => Some(Arc::new(MemoryDurableStore::new())),
        };

        let engine = match durable {
            Some(durable) => CacheEngine::with_durable(config.memory_capacity, config.default_ttl(), durable),
            None => CacheEngine::new(config.memory_capacity, config.default_ttl()),
        };
        Self::new(engine, config.batch_window())
    }
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.engine.stats(),
        state.queries.stats(),
        state.orchestrator.stats().await,
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for POST /scopes/:scope/setup
///
/// Opens the orders, menu and sessions subscriptions for the scope.
pub async fn setup_scope_handler(
    State(state): State<AppState>,
    Path(scope): Path<String>,
) -> ApiResult<Json<ScopeResponse>> {
    state.orchestrator.setup(&scope).await?;
    let current = state.orchestrator.scope_state(&scope).await;
    Ok(Json(ScopeResponse::new(scope, current)))
}

/// Handler for DELETE /scopes/:scope
///
/// Idempotent: tearing down an inactive scope reports its current state.
pub async fn teardown_scope_handler(
    State(state): State<AppState>,
    Path(scope): Path<String>,
) -> Json<ScopeResponse> {
    state.orchestrator.teardown_scope(&scope).await;
    let current = state.orchestrator.scope_state(&scope).await;
    Json(ScopeResponse::new(scope, current))
}

/// Handler for POST /scopes/:scope/invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    Json(req): Json<InvalidateRequest>,
) -> Json<InvalidateResponse> {
    if req.batched {
        state.orchestrator.queue_invalidation(req.kind, &scope);
        return Json(InvalidateResponse::queued(scope, req.kind));
    }

    let applied = state.orchestrator.invalidate(req.kind, &scope).await;
    Json(InvalidateResponse::applied(scope, req.kind, applied))
}

/// Handler for POST /changes
///
/// Publishes a raw change into the local transport, as the remote store
/// would.
pub async fn publish_change_handler(
    State(state): State<AppState>,
    Json(req): Json<ChangeRequest>,
) -> ApiResult<Json<ChangeResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }
    let scope = req
        .resolve_scope()
        .ok_or_else(|| ApiError::InvalidRequest("Change carries no scope".to_string()))?;

    let delivered = state.transport.publish(&scope, req.change);
    Ok(Json(ChangeResponse { scope, delivered }))
}
