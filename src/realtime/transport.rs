//! Change Transport Module
//!
//! The boundary to whatever delivers change notifications, plus an in-process
//! implementation used by the binary and the tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::realtime::{EntityClass, RawChange};

// == Channel Types ==
/// Lifecycle signals reported on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    Closed,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    Change(RawChange),
    Status(ChannelStatus),
}

/// What a channel listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelFilter {
    pub scope: String,
    pub class: EntityClass,
}

impl ChannelFilter {
    pub fn new(scope: impl Into<String>, class: EntityClass) -> Self {
        Self {
            scope: scope.into(),
            class,
        }
    }

    pub fn matches(&self, scope: &str, table: &str) -> bool {
        self.scope == scope && self.class.covers(table)
    }
}

/// Unique channel name, e.g. `orders:r1:3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(filter: &ChannelFilter, sequence: u64) -> Self {
        Self(format!("{}:{}:{}", filter.class, filter.scope, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type MessageReceiver = mpsc::UnboundedReceiver<TransportMessage>;

// == Change Transport Trait ==
/// Delivers changes for a (scope, entity class) filter.
///
/// Delivery is at-least-once per open channel, in transport order, with no
/// ordering across channels.
#[async_trait]
pub trait ChangeTransport: Send + Sync {
    /// Opens a channel. The receiver ends once the channel is closed.
    async fn open(&self, id: &ChannelId, filter: &ChannelFilter) -> Result<MessageReceiver, TransportError>;

    /// Closes a channel. Closing an unknown or already closed channel is a no-op.
    async fn close(&self, id: &ChannelId);
}

// == Local Transport ==
#[derive(Debug, Default)]
struct LocalState {
    channels: HashMap<ChannelId, (ChannelFilter, mpsc::UnboundedSender<TransportMessage>)>,
    shut_down: bool,
}

/// In-process transport: published changes are routed to every open channel
/// whose filter matches.
#[derive(Debug, Default)]
pub struct LocalTransport {
    state: Mutex<LocalState>,
    close_calls: AtomicU64,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Publish ==
    /// Routes `change` to every matching channel for `scope`.
    ///
    /// Returns the number of channels it was delivered to.
    pub fn publish(&self, scope: &str, change: RawChange) -> usize {
        let state = self.state();
        let mut delivered = 0;
        for (id, (filter, sender)) in &state.channels {
            if !filter.matches(scope, &change.table) {
                continue;
            }
            if sender.send(TransportMessage::Change(change.clone())).is_ok() {
                delivered += 1;
            } else {
                debug!(channel = %id, "Channel receiver gone, dropping change");
            }
        }
        debug!(scope, table = %change.table, delivered, "Published change");
        delivered
    }

    /// Reports an error signal on every open channel.
    pub fn report_error(&self, message: &str) {
        for (_, sender) in self.state().channels.values() {
            let _ = sender.send(TransportMessage::Status(ChannelStatus::Error(message.to_string())));
        }
    }

    /// Closes every channel and refuses new ones.
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.shut_down = true;
        for (_, (_, sender)) in state.channels.drain() {
            let _ = sender.send(TransportMessage::Status(ChannelStatus::Closed));
        }
        info!("Local transport shut down");
    }

    pub fn open_channels(&self) -> usize {
        self.state().channels.len()
    }

    /// Number of `close` calls that closed a live channel.
    pub fn close_calls(&self) -> u64 {
        self.close_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChangeTransport for LocalTransport {
    async fn open(&self, id: &ChannelId, filter: &ChannelFilter) -> Result<MessageReceiver, TransportError> {
        let mut state = self.state();
        if state.shut_down {
            return Err(TransportError::Closed);
        }
        if state.channels.contains_key(id) {
            return Err(TransportError::Open(format!("channel {} already open", id)));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(TransportMessage::Status(ChannelStatus::Subscribed));
        state.channels.insert(id.clone(), (filter.clone(), sender));
        Ok(receiver)
    }

    async fn close(&self, id: &ChannelId) {
        let removed = self.state().channels.remove(id);
        match removed {
            Some((_, sender)) => {
                self.close_calls.fetch_add(1, Ordering::Relaxed);
                let _ = sender.send(TransportMessage::Status(ChannelStatus::Closed));
            }
            None => warn!(channel = %id, "Close requested for unknown channel"),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeKind;
    use serde_json::json;

    fn change(table: &str) -> RawChange {
        RawChange {
            table: table.into(),
            kind: ChangeKind::Insert,
            before: None,
            after: json!({"id": "x"}).as_object().cloned(),
        }
    }

    #[tokio::test]
    async fn test_open_emits_subscribed() {
        let transport = LocalTransport::new();
        let filter = ChannelFilter::new("r1", EntityClass::Orders);
        let mut rx = transport.open(&ChannelId::new(&filter, 1), &filter).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(TransportMessage::Status(ChannelStatus::Subscribed))
        );
    }

    #[tokio::test]
    async fn test_publish_routes_by_scope_and_class() {
        let transport = LocalTransport::new();
        let orders = ChannelFilter::new("r1", EntityClass::Orders);
        let menu = ChannelFilter::new("r1", EntityClass::Menu);
        let other = ChannelFilter::new("r2", EntityClass::Orders);
        let mut rx_orders = transport.open(&ChannelId::new(&orders, 1), &orders).await.unwrap();
        let _rx_menu = transport.open(&ChannelId::new(&menu, 2), &menu).await.unwrap();
        let _rx_other = transport.open(&ChannelId::new(&other, 3), &other).await.unwrap();

        assert_eq!(transport.publish("r1", change("order_items")), 1);

        rx_orders.recv().await; // Subscribed
        assert_eq!(
            rx_orders.recv().await,
            Some(TransportMessage::Change(change("order_items")))
        );
    }

    #[tokio::test]
    async fn test_close_ends_receiver() {
        let transport = LocalTransport::new();
        let filter = ChannelFilter::new("r1", EntityClass::Sessions);
        let id = ChannelId::new(&filter, 1);
        let mut rx = transport.open(&id, &filter).await.unwrap();

        transport.close(&id).await;
        transport.close(&id).await;

        assert_eq!(transport.close_calls(), 1);
        rx.recv().await; // Subscribed
        assert_eq!(rx.recv().await, Some(TransportMessage::Status(ChannelStatus::Closed)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_channels() {
        let transport = LocalTransport::new();
        transport.shutdown();

        let filter = ChannelFilter::new("r1", EntityClass::Menu);
        let result = transport.open(&ChannelId::new(&filter, 1), &filter).await;
        assert_eq!(result.unwrap_err(), TransportError::Closed);
    }
}
