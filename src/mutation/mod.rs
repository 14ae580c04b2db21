//! Optimistic order mutations
//!
//! Speculative updates to cached order queries, rolled back when the remote
//! write fails and reconciled through the orchestrator once settled.

mod coordinator;
mod status;

pub use coordinator::{MutationCoordinator, OrderRemote};
pub use status::{apply_status, is_order, OrderStatus};
