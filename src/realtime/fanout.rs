//! Change Subscription Fan-out
//!
//! Each subscription owns one transport channel and one task running the
//! receive loop, forwarding decoded events to its listener. Teardown stops the
//! loop, awaits its exit and closes the channel, so no listener call can start
//! after `teardown()` returns.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::realtime::{
    ChangeEvent, ChangeTransport, ChannelFilter, ChannelId, ChannelStatus, EntityClass,
    MessageReceiver, TransportMessage,
};

// == Listener ==
/// Receives decoded change events for one subscription.
///
/// Errors and panics are logged by the fan-out and never tear down the
/// channel.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_change(&self, event: ChangeEvent) -> anyhow::Result<()>;
}

/// Adapter turning a synchronous closure into a listener.
pub struct FnListener<F>(pub F);

#[async_trait]
impl<F> ChangeListener for FnListener<F>
where
    F: Fn(ChangeEvent) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_change(&self, event: ChangeEvent) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Wraps a closure as a shareable listener.
pub fn listener_fn<F>(f: F) -> Arc<dyn ChangeListener>
where
    F: Fn(ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

// == Subscription Id ==
/// (scope, entity class) plus a counter disambiguating concurrent
/// subscriptions to the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    pub scope: String,
    pub class: EntityClass,
    pub sequence: u64,
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.class, self.scope, self.sequence)
    }
}

// == Subscription ==
struct LiveChannel {
    id: SubscriptionId,
    channel: ChannelId,
    transport: Arc<dyn ChangeTransport>,
    /// Stop signal and loop task, taken by the first teardown
    running: tokio::sync::Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl LiveChannel {
    /// Stops the loop and closes the channel. Returns false if already done.
    async fn shut_down(&self) -> bool {
        let mut running = self.running.lock().await;
        let Some((stop, task)) = running.take() else {
            return false;
        };

        // The loop may already have exited on its own
        let _ = stop.send(());
        if let Err(e) = task.await {
            if e.is_panic() {
                error!(subscription = %self.id, "Receive loop panicked");
            }
        }
        self.transport.close(&self.channel).await;

        debug!(subscription = %self.id, channel = %self.channel, "Subscription torn down");
        true
    }
}

type Registry = Arc<Mutex<HashMap<SubscriptionId, Arc<LiveChannel>>>>;

fn registry(live: &Registry) -> MutexGuard<'_, HashMap<SubscriptionId, Arc<LiveChannel>>> {
    live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A live subscription owned by the caller that opened it.
///
/// Dropping it without `teardown` leaves the channel open until
/// `ChangeFanout::cleanup_all_subscriptions`.
pub struct Subscription {
    channel: Arc<LiveChannel>,
    live: Registry,
}

impl Subscription {
    pub fn id(&self) -> &SubscriptionId {
        &self.channel.id
    }

    // == Teardown ==
    /// Closes the channel and waits for the receive loop to exit.
    ///
    /// Idempotent: later calls, or calls after the transport closed the
    /// channel, do nothing.
    pub async fn teardown(&self) {
        if self.channel.shut_down().await {
            registry(&self.live).remove(&self.channel.id);
        }
    }

    pub async fn is_active(&self) -> bool {
        self.channel.running.lock().await.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.channel.id)
            .field("channel", &self.channel.channel)
            .finish()
    }
}

// == Change Fan-out ==
pub struct ChangeFanout {
    transport: Arc<dyn ChangeTransport>,
    next_sequence: AtomicU64,
    live: Registry,
}

impl ChangeFanout {
    pub fn new(transport: Arc<dyn ChangeTransport>) -> Self {
        Self {
            transport,
            next_sequence: AtomicU64::new(1),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // == Subscribe ==
    /// Opens a fresh channel for (scope, class) and starts delivering to
    /// `listener`.
    ///
    /// Every call allocates its own channel; there is no deduplication across
    /// callers.
    pub async fn subscribe(
        &self,
        scope: &str,
        class: EntityClass,
        listener: Arc<dyn ChangeListener>,
    ) -> Result<Subscription, TransportError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let id = SubscriptionId {
            scope: scope.to_string(),
            class,
            sequence,
        };
        let filter = ChannelFilter::new(scope, class);
        let channel_id = ChannelId::new(&filter, sequence);

        let receiver = self.transport.open(&channel_id, &filter).await?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(receive_loop(id.clone(), receiver, stop_rx, listener));

        let channel = Arc::new(LiveChannel {
            id: id.clone(),
            channel: channel_id,
            transport: self.transport.clone(),
            running: tokio::sync::Mutex::new(Some((stop_tx, task))),
        });
        registry(&self.live).insert(id.clone(), channel.clone());

        debug!(subscription = %id, "Subscription opened");
        Ok(Subscription {
            channel,
            live: self.live.clone(),
        })
    }

    pub async fn subscribe_to_orders(
        &self,
        scope: &str,
        listener: Arc<dyn ChangeListener>,
    ) -> Result<Subscription, TransportError> {
        self.subscribe(scope, EntityClass::Orders, listener).await
    }

    pub async fn subscribe_to_menu(
        &self,
        scope: &str,
        listener: Arc<dyn ChangeListener>,
    ) -> Result<Subscription, TransportError> {
        self.subscribe(scope, EntityClass::Menu, listener).await
    }

    pub async fn subscribe_to_sessions(
        &self,
        scope: &str,
        listener: Arc<dyn ChangeListener>,
    ) -> Result<Subscription, TransportError> {
        self.subscribe(scope, EntityClass::Sessions, listener).await
    }

    // == Cleanup All ==
    /// Force-closes every open channel process-wide.
    ///
    /// For abnormal recovery; owners should normally tear down their own
    /// subscriptions. Returns the number of channels closed.
    pub async fn cleanup_all_subscriptions(&self) -> usize {
        let channels: Vec<Arc<LiveChannel>> = registry(&self.live).drain().map(|(_, c)| c).collect();

        let mut closed = 0;
        for channel in channels {
            if channel.shut_down().await {
                closed += 1;
            }
        }

        if closed > 0 {
            info!(closed, "Force-closed all subscriptions");
        }
        closed
    }

    /// Number of subscriptions not yet torn down.
    pub fn live_subscriptions(&self) -> usize {
        registry(&self.live).len()
    }
}

// == Receive Loop ==
async fn receive_loop(
    id: SubscriptionId,
    mut receiver: MessageReceiver,
    mut stop: oneshot::Receiver<()>,
    listener: Arc<dyn ChangeListener>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            message = receiver.recv() => match message {
                Some(TransportMessage::Change(raw)) => {
                    if !id.class.covers(&raw.table) {
                        warn!(subscription = %id, table = %raw.table, "Change outside subscribed class, dropping");
                        continue;
                    }
                    match ChangeEvent::decode(raw, Some(&id.scope)) {
                        Ok(event) if event.scope == id.scope => dispatch(&id, listener.as_ref(), event).await,
                        Ok(event) => {
                            warn!(subscription = %id, scope = %event.scope, "Change for another scope, dropping");
                        }
                        Err(e) => warn!(subscription = %id, error = %e, "Undecodable change, dropping"),
                    }
                }
                Some(TransportMessage::Status(ChannelStatus::Subscribed)) => {
                    info!(subscription = %id, "Channel subscribed");
                }
                Some(TransportMessage::Status(ChannelStatus::Closed)) => {
                    info!(subscription = %id, "Channel closed by transport");
                }
                Some(TransportMessage::Status(ChannelStatus::Error(message))) => {
                    warn!(subscription = %id, error = %message, "Channel error");
                }
                None => {
                    debug!(subscription = %id, "Channel ended");
                    break;
                }
            }
        }
    }
}

async fn dispatch(id: &SubscriptionId, listener: &dyn ChangeListener, event: ChangeEvent) {
    let table = event.entity_table.clone();
    match AssertUnwindSafe(listener.on_change(event)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(subscription = %id, table = %table, error = %e, "Listener failed"),
        Err(_) => error!(subscription = %id, table = %table, "Listener panicked"),
    }
}
