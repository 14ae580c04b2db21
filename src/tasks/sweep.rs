//! TTL Sweep Task
//!
//! Background task that periodically drops expired entries from both tiers
//! of the cache engine and stale query results. Reads already skip expired
//! entries; the sweep only reclaims their space.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;
use crate::query::QueryCache;

/// Spawns the periodic TTL sweep.
///
/// # Arguments
/// * `engine` - Shared cache engine to sweep
/// * `queries` - Shared query result cache to sweep
/// * `sweep_interval_secs` - Interval in seconds between runs (minimum 1)
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
pub fn spawn_sweep_task(
    engine: Arc<CacheEngine>,
    queries: Arc<QueryCache>,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Starting TTL sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = engine.sweep_expired().await;
            let stale_queries = queries.sweep_expired();
            if removed > 0 || stale_queries > 0 {
                info!(removed, stale_queries, "TTL sweep: removed expired entries");
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}
