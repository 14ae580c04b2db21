//! Query Result Module
//!
//! Cache of derived query results addressed exclusively by `QueryKey`.

mod cache;
mod key;
pub mod keys;

pub use cache::{
    Match, QueryCache, QueryCacheEvent, QueryCacheStats, QuerySnapshot, DEFAULT_STALE_AFTER,
};
pub use key::{KeySegment, QueryKey};
