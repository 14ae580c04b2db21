//! Configuration Module
//!
//! Handles loading and managing runtime configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::orchestrator::DEFAULT_BATCH_WINDOW_MS;

/// Runtime configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of entries the in-memory tier holds before eviction kicks in
    pub memory_capacity: usize,
    /// Default TTL in milliseconds for entries set without explicit TTL
    pub default_ttl_ms: u64,
    /// Background TTL sweep interval in seconds
    pub sweep_interval: u64,
    /// Invalidation batch window in milliseconds
    pub batch_window_ms: u64,
    /// Snapshot file for the durable tier, None = in-process durable tier
    pub durable_path: Option<PathBuf>,
    /// Admin HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMORY_CAPACITY` - In-memory tier capacity (default: 100)
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `SWEEP_INTERVAL_SECS` - TTL sweep frequency in seconds (default: 300)
    /// - `BATCH_WINDOW_MS` - Invalidation batch window (default: 100)
    /// - `DURABLE_PATH` - Durable snapshot file (default: unset)
    /// - `SERVER_PORT` - Admin HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_capacity: parse_var("MEMORY_CAPACITY").unwrap_or(defaults.memory_capacity),
            default_ttl_ms: parse_var("DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl_ms),
            sweep_interval: parse_var("SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval),
            batch_window_ms: parse_var("BATCH_WINDOW_MS").unwrap_or(defaults.batch_window_ms),
            durable_path: env::var("DURABLE_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_CAPACITY,
            default_ttl_ms: DEFAULT_TTL.as_millis() as u64,
            sweep_interval: 300,
            batch_window_ms: DEFAULT_BATCH_WINDOW_MS,
            durable_path: None,
            server_port: 3000,
        }
    }
}
