//! Order status values and the fields that follow from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a stored status value. Unknown values yield None.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "preparing" => Some(OrderStatus::Preparing),
            "ready" => Some(OrderStatus::Ready),
            "served" => Some(OrderStatus::Served),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Served and cancelled orders no longer move.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Served | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Apply Status ==
/// Writes `status` and its derived fields into an order record.
///
/// Reverting to pending releases the claim; serving stamps `served_at`.
/// Non-object values are left untouched.
pub fn apply_status(order: &mut Value, status: OrderStatus, now: DateTime<Utc>) {
    let Some(record) = order.as_object_mut() else {
        return;
    };
    let stamp = Value::String(now.to_rfc3339());

    record.insert("status".into(), Value::String(status.as_str().into()));
    record.insert("updated_at".into(), stamp.clone());

    match status {
        OrderStatus::Pending => {
            record.insert("claimed_by".into(), Value::Null);
            record.insert("claimed_at".into(), Value::Null);
        }
        OrderStatus::Served => {
            record.insert("served_at".into(), stamp);
        }
        _ => {}
    }
}

/// True when `order` is an object whose `id` equals `order_id`.
pub fn is_order(order: &Value, order_id: &str) -> bool {
    match order.get("id") {
        Some(Value::String(id)) => id == order_id,
        Some(Value::Number(id)) => id.to_string() == order_id,
        _ => false,
    }
}
