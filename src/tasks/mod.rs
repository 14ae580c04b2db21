//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - TTL Sweep: Removes expired entries from both cache tiers and stale query results

mod sweep;

pub use sweep::spawn_sweep_task;
