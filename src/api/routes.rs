//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_handler, publish_change_handler, setup_scope_handler, stats_handler,
    teardown_scope_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/scopes/:scope", delete(teardown_scope_handler))
        .route("/scopes/:scope/setup", post(setup_scope_handler))
        .route("/scopes/:scope/invalidate", post(invalidate_handler))
        .route("/changes", post(publish_change_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
