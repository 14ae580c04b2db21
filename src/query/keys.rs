//! Query key builders for every cached domain.
//!
//! Layout: `[domain, scope, sub-resource, ...]`. Builders ending in `_all`
//! are prefixes meant for non-exact invalidation.

use crate::query::QueryKey;
use crate::query_key;

pub mod orders {
    use super::*;

    /// Every cached order query for a scope.
    pub fn all(scope: &str) -> QueryKey {
        query_key!["orders", scope]
    }

    /// Prefix of every order-list variant for a scope.
    pub fn lists(scope: &str) -> QueryKey {
        query_key!["orders", scope, "list"]
    }

    /// One order-list variant, `filter` being the filter fingerprint.
    pub fn list(scope: &str, filter: &str) -> QueryKey {
        query_key!["orders", scope, "list", filter]
    }

    pub fn detail(scope: &str, order_id: &str) -> QueryKey {
        query_key!["orders", scope, "detail", order_id]
    }

    pub fn history(scope: &str) -> QueryKey {
        query_key!["orders", scope, "history"]
    }
}

pub mod menu {
    use super::*;

    pub fn all(scope: &str) -> QueryKey {
        query_key!["menu", scope]
    }

    pub fn items(scope: &str) -> QueryKey {
        query_key!["menu", scope, "items"]
    }

    pub fn categories(scope: &str) -> QueryKey {
        query_key!["menu", scope, "categories"]
    }
}

pub mod restaurant {
    use super::*;

    pub fn profile(scope: &str) -> QueryKey {
        query_key!["restaurant", scope]
    }
}

pub mod sessions {
    use super::*;

    pub fn all(scope: &str) -> QueryKey {
        query_key!["sessions", scope]
    }
}

pub mod analytics {
    use super::*;

    pub fn all(scope: &str) -> QueryKey {
        query_key!["analytics", scope]
    }

    pub fn dashboard(scope: &str) -> QueryKey {
        query_key!["analytics", scope, "dashboard"]
    }
}

// == Cache Engine Tags ==
pub mod tags {
    pub fn orders(scope: &str) -> String {
        format!("orders-{}", scope)
    }

    pub fn menu(scope: &str) -> String {
        format!("menu-{}", scope)
    }

    pub fn sessions(scope: &str) -> String {
        format!("sessions-{}", scope)
    }

    pub fn analytics(scope: &str) -> String {
        format!("analytics-{}", scope)
    }

    pub fn restaurant(scope: &str) -> String {
        format!("restaurant-{}", scope)
    }
}
