//! Real-time marketplace messaging.
//!
//! [`Client`] owns one reconnecting WebSocket connection to the message server.
//! Inbound envelopes are routed by [`MessageKind`]: order updates and
//! notifications are written to a [`StateSink`](crate::store::StateSink) first,
//! then every envelope with a recognized type reaches the listeners registered
//! for it. Outbound messages sent while disconnected are queued and flushed in
//! order once a connection opens.
//!
//! [`Supervisor`] wraps a client with a bounded initial retry and reacts to
//! application lifecycle events.

pub mod client;
pub mod dispatch;
pub mod listeners;
pub mod notifier;
pub mod supervisor;
pub mod types;

pub use client::Client;
pub use listeners::ListenerId;
pub use notifier::{DesktopNotifier, Permission};
pub use supervisor::{LifecycleEvent, Supervisor, SupervisorConfig};
pub use types::request::OutboundMessage;
pub use types::response::{InboundEnvelope, MessageKind, NotificationPayload, OrderUpdate};
