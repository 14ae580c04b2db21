//! API Module
//!
//! HTTP handlers and routing for the admin REST API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Engine, query cache and orchestrator statistics
//! - `POST /scopes/:scope/setup` - Activate invalidation for a scope
//! - `DELETE /scopes/:scope` - Tear a scope down
//! - `POST /scopes/:scope/invalidate` - Manual or batched invalidation
//! - `POST /changes` - Publish a raw change into the local transport

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
