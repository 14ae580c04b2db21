//! Orchestrator Module
//!
//! Maps change events and manual requests to invalidations of both caches.

mod batch;
mod invalidator;
mod plan;

pub use batch::{InvalidationBatch, DEFAULT_BATCH_WINDOW_MS};
pub use invalidator::{Applied, InvalidationOrchestrator, OrchestratorStats, ScopeState};
pub use plan::{plan_for, InvalidationKind, InvalidationPlan};
