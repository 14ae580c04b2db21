//! Order Cache - admin server
//!
//! Hosts the cache coherence core behind a small admin HTTP surface.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use order_cache::api::create_router;
use order_cache::{spawn_sweep_task, AppState, Config};

/// Main entry point for the order cache admin server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache engine, query cache, transport and orchestrator
/// 4. Start background TTL sweep task
/// 5. Serve the admin router on the configured port
/// 6. On SIGINT/SIGTERM tear every scope down and close the transport
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting order cache");

    let config = Config::from_env();
    info!(
        memory_capacity = config.memory_capacity,
        default_ttl_ms = config.default_ttl_ms,
        sweep_interval_secs = config.sweep_interval,
        batch_window_ms = config.batch_window_ms,
        port = config.server_port,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).await;
    let sweep_handle = spawn_sweep_task(state.engine.clone(), state.queries.clone(), config.sweep_interval);

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweep_handle.abort();
    warn!("Sweep task aborted");

    state.orchestrator.cleanup().await;
    state.transport.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
