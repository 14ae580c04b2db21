//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::orchestrator::InvalidationKind;
use crate::realtime::RawChange;

/// Request body for POST /scopes/:scope/invalidate
///
/// # Fields
/// - `kind`: Domain to invalidate (`all`, `orders`, `menu`, ...)
/// - `batched`: Queue into the current batch instead of applying now
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub kind: InvalidationKind,
    #[serde(default)]
    pub batched: bool,
}

/// Request body for POST /changes
///
/// A raw change as the remote store would emit it. `scope` is only needed
/// when the record does not carry a `restaurant_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRequest {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub change: RawChange,
}

impl ChangeRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.change.table.is_empty() {
            return Some("Table cannot be empty".to_string());
        }
        if self.change.before.is_none() && self.change.after.is_none() {
            return Some("Change must carry a before or after record".to_string());
        }
        None
    }

    /// Scope to publish under: explicit first, then the record's own.
    pub fn resolve_scope(&self) -> Option<String> {
        self.scope
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.change.record_scope())
    }
}
