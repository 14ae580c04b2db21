//! Change Event Module
//!
//! Decoded change notifications and the entity classes they are grouped by.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EventError;

/// Record field naming the owning scope.
pub const SCOPE_FIELD: &str = "restaurant_id";

/// A row as delivered by the change transport.
pub type Record = Map<String, Value>;

// == Change Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

// == Entity Class ==
/// Change-event classes a subscription can be opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Orders,
    Menu,
    Sessions,
}

impl EntityClass {
    pub const ALL: [EntityClass; 3] = [EntityClass::Orders, EntityClass::Menu, EntityClass::Sessions];

    /// Tables whose changes belong to this class.
    pub fn tables(self) -> &'static [&'static str] {
        match self {
            EntityClass::Orders => &["orders", "order_items"],
            EntityClass::Menu => &["menu_items", "menu_categories", "restaurants"],
            EntityClass::Sessions => &["table_sessions"],
        }
    }

    pub fn covers(self, table: &str) -> bool {
        self.tables().contains(&table)
    }

    pub fn for_table(table: &str) -> Option<EntityClass> {
        Self::ALL.into_iter().find(|class| class.covers(table))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityClass::Orders => "orders",
            EntityClass::Menu => "menu",
            EntityClass::Sessions => "sessions",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Raw Change ==
/// Undecoded change as it arrives from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub table: String,
    pub kind: ChangeKind,
    #[serde(default)]
    pub before: Option<Record>,
    #[serde(default)]
    pub after: Option<Record>,
}

impl RawChange {
    /// Scope named by the record itself, `after` first.
    pub fn record_scope(&self) -> Option<String> {
        self.after
            .as_ref()
            .and_then(|r| field_as_string(r, SCOPE_FIELD))
            .or_else(|| self.before.as_ref().and_then(|r| field_as_string(r, SCOPE_FIELD)))
    }
}

// == Change Event ==
/// A decoded change with a resolved scope.
///
/// At least one of `before`/`after` is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub entity_table: String,
    pub kind: ChangeKind,
    pub before: Option<Record>,
    pub after: Option<Record>,
    pub scope: String,
}

impl ChangeEvent {
    // == Decode ==
    /// Decodes a raw change.
    ///
    /// The scope comes from the record's `restaurant_id`, falling back to
    /// `channel_scope` for child rows that do not carry it.
    pub fn decode(raw: RawChange, channel_scope: Option<&str>) -> Result<Self, EventError> {
        if raw.before.is_none() && raw.after.is_none() {
            return Err(EventError::MissingPayload(raw.table));
        }

        let scope = match raw.record_scope().or_else(|| channel_scope.map(str::to_string)) {
            Some(scope) if !scope.is_empty() => scope,
            _ => return Err(EventError::UnresolvedScope(raw.table)),
        };

        Ok(Self {
            entity_table: raw.table,
            kind: raw.kind,
            before: raw.before,
            after: raw.after,
            scope,
        })
    }

    /// Field value as a string, looking at `after` then `before`.
    ///
    /// Numbers are rendered in decimal so numeric ids compare as keys.
    pub fn field(&self, name: &str) -> Option<String> {
        self.after
            .as_ref()
            .and_then(|r| field_as_string(r, name))
            .or_else(|| self.before.as_ref().and_then(|r| field_as_string(r, name)))
    }

    /// Field value from `after` only.
    pub fn after_field(&self, name: &str) -> Option<String> {
        self.after.as_ref().and_then(|r| field_as_string(r, name))
    }
}

fn field_as_string(record: &Record, name: &str) -> Option<String> {
    match record.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
