//! Realtime Module
//!
//! Change events, the transport boundary and the subscription fan-out.

mod event;
mod fanout;
mod transport;

pub use event::{ChangeEvent, ChangeKind, EntityClass, RawChange, Record, SCOPE_FIELD};
pub use fanout::{listener_fn, ChangeFanout, ChangeListener, FnListener, Subscription, SubscriptionId};
pub use transport::{
    ChangeTransport, ChannelFilter, ChannelId, ChannelStatus, LocalTransport, MessageReceiver,
    TransportMessage,
};
