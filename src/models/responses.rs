//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::orchestrator::{Applied, InvalidationKind, OrchestratorStats, ScopeState};
use crate::query::QueryCacheStats;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub queries: QueryCacheStats,
    pub orchestrator: OrchestratorStats,
}

impl StatsResponse {
    pub fn new(cache: CacheStats, queries: QueryCacheStats, orchestrator: OrchestratorStats) -> Self {
        Self {
            hit_rate: cache.hit_rate(),
            cache,
            queries,
            orchestrator,
        }
    }
}

/// Response body for scope setup and teardown
#[derive(Debug, Clone, Serialize)]
pub struct ScopeResponse {
    pub scope: String,
    pub state: ScopeState,
}

impl ScopeResponse {
    pub fn new(scope: impl Into<String>, state: ScopeState) -> Self {
        Self {
            scope: scope.into(),
            state,
        }
    }
}

/// Response body for POST /scopes/:scope/invalidate
///
/// Counts are zero for batched requests; the work happens at flush.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub scope: String,
    pub kind: InvalidationKind,
    pub batched: bool,
    pub query_results: usize,
    pub engine_entries: usize,
}

impl InvalidateResponse {
    pub fn applied(scope: impl Into<String>, kind: InvalidationKind, applied: Applied) -> Self {
        Self {
            scope: scope.into(),
            kind,
            batched: false,
            query_results: applied.query_results,
            engine_entries: applied.engine_entries,
        }
    }

    pub fn queued(scope: impl Into<String>, kind: InvalidationKind) -> Self {
        Self {
            scope: scope.into(),
            kind,
            batched: true,
            query_results: 0,
            engine_entries: 0,
        }
    }
}

/// Response body for POST /changes
#[derive(Debug, Clone, Serialize)]
pub struct ChangeResponse {
    pub scope: String,
    /// Number of open channels the change was routed to
    pub delivered: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
