//! Invalidation Plans
//!
//! Pure mapping from change events and manual requests to the exact query
//! keys and engine tags that go stale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mutation::OrderStatus;
use crate::query::keys::{analytics, menu, orders, restaurant, sessions, tags};
use crate::query::{Match, QueryKey};
use crate::realtime::ChangeEvent;

// == Invalidation Kind ==
/// Domains a manual or batched invalidation can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationKind {
    All,
    Orders,
    Menu,
    Analytics,
    Sessions,
    Restaurant,
}

impl fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvalidationKind::All => "all",
            InvalidationKind::Orders => "orders",
            InvalidationKind::Menu => "menu",
            InvalidationKind::Analytics => "analytics",
            InvalidationKind::Sessions => "sessions",
            InvalidationKind::Restaurant => "restaurant",
        };
        f.write_str(name)
    }
}

// == Invalidation Plan ==
/// Query keys and engine tags to invalidate together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub queries: Vec<(QueryKey, Match)>,
    pub tags: Vec<String>,
}

impl InvalidationPlan {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.tags.is_empty()
    }

    fn query(mut self, key: QueryKey, mode: Match) -> Self {
        if !self.queries.iter().any(|(k, m)| *k == key && *m == mode) {
            self.queries.push((key, mode));
        }
        self
    }

    fn tag(mut self, tag: String) -> Self {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Appends every key and tag of `other` not already planned.
    pub fn merge(mut self, other: InvalidationPlan) -> Self {
        for (key, mode) in other.queries {
            self = self.query(key, mode);
        }
        for tag in other.tags {
            self = self.tag(tag);
        }
        self
    }

    // == Orders Action ==
    /// Every order list and the history for `scope`, the detail of `order_id`
    /// when known, and the `orders-<scope>` tag.
    pub fn orders(scope: &str, order_id: Option<&str>) -> Self {
        let plan = Self::default()
            .query(orders::lists(scope), Match::Prefix)
            .query(orders::history(scope), Match::Exact);
        let plan = match order_id {
            Some(id) => plan.query(orders::detail(scope, id), Match::Exact),
            None => plan,
        };
        plan.tag(tags::orders(scope))
    }

    pub fn dashboard(scope: &str) -> Self {
        Self::default().query(analytics::dashboard(scope), Match::Exact)
    }

    pub fn menu(scope: &str) -> Self {
        Self::default()
            .query(menu::all(scope), Match::Prefix)
            .tag(tags::menu(scope))
    }

    pub fn restaurant_profile(scope: &str) -> Self {
        Self::default().query(restaurant::profile(scope), Match::Exact)
    }

    pub fn sessions(scope: &str) -> Self {
        Self::default()
            .query(orders::lists(scope), Match::Prefix)
            .query(sessions::all(scope), Match::Prefix)
            .tag(tags::sessions(scope))
    }

    // == Manual Kinds ==
    /// Plan for a manual or batched request.
    ///
    /// Manual requests are coarser than event plans: each clears the whole
    /// domain prefix for the scope plus the matching engine tag.
    pub fn for_kind(kind: InvalidationKind, scope: &str) -> Self {
        match kind {
            InvalidationKind::Orders => Self::default()
                .query(orders::all(scope), Match::Prefix)
                .tag(tags::orders(scope)),
            InvalidationKind::Menu => Self::menu(scope),
            InvalidationKind::Analytics => Self::default()
                .query(analytics::all(scope), Match::Prefix)
                .tag(tags::analytics(scope)),
            InvalidationKind::Sessions => Self::default()
                .query(sessions::all(scope), Match::Prefix)
                .tag(tags::sessions(scope)),
            InvalidationKind::Restaurant => Self::default()
                .query(restaurant::profile(scope), Match::Prefix)
                .tag(tags::restaurant(scope)),
            InvalidationKind::All => [
                InvalidationKind::Orders,
                InvalidationKind::Menu,
                InvalidationKind::Analytics,
                InvalidationKind::Sessions,
                InvalidationKind::Restaurant,
            ]
            .into_iter()
            .fold(Self::default(), |plan, kind| plan.merge(Self::for_kind(kind, scope))),
        }
    }
}

// == Event Classification ==
/// Maps a change event to its invalidation plan.
///
/// Returns None for tables this core does not know about.
pub fn plan_for(event: &ChangeEvent) -> Option<InvalidationPlan> {
    let scope = event.scope.as_str();

    let plan = match event.entity_table.as_str() {
        "orders" => {
            let plan = InvalidationPlan::orders(scope, event.field("id").as_deref());
            // Terminal orders change aggregate dashboard figures
            let terminal = event
                .after_field("status")
                .and_then(|status| OrderStatus::parse(&status))
                .is_some_and(OrderStatus::is_terminal);
            if terminal {
                plan.merge(InvalidationPlan::dashboard(scope))
            } else {
                plan
            }
        }
        "order_items" => InvalidationPlan::orders(scope, event.field("order_id").as_deref()),
        "menu_items" | "menu_categories" => InvalidationPlan::menu(scope),
        "restaurants" => InvalidationPlan::restaurant_profile(scope),
        "table_sessions" => InvalidationPlan::sessions(scope),
        _ => return None,
    };

    Some(plan)
}
