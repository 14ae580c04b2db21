//! Order Cache - client-side cache coherence for order management
//!
//! A two-tier cache engine, a query result cache with optimistic
//! snapshot/rollback, a change-subscription fan-out and the invalidation
//! orchestrator that keeps both caches coherent with the remote store.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod mutation;
pub mod orchestrator;
pub mod query;
pub mod realtime;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_sweep_task;
