//! Real-time client for the marketplace administration and vendor-operations
//! platform.
//!
//! The client owns a single WebSocket connection to the marketplace message
//! server. It keeps the connection alive with heartbeats, reconnects with
//! exponential backoff when the connection is lost, routes inbound messages to
//! registered listeners and to the application [`store`], and exposes helpers for
//! joining rooms and following order updates.
//!
//! # Example
//!
//! ```rust, no_run
//! use std::sync::Arc;
//!
//! use marketplace_realtime::realtime::{Client, MessageKind};
//! use marketplace_realtime::store::Store;
//! use marketplace_realtime::ws::config::Config;
//! use secrecy::SecretString;
//!
//! # async fn example() -> marketplace_realtime::Result<()> {
//! let store = Arc::new(Store::default());
//! let client = Client::new("ws://localhost:5000/ws", Config::default(), store.clone())?;
//!
//! client.add_listener(MessageKind::ListingUpdate, |payload| {
//!     println!("listing changed: {payload}");
//! });
//!
//! client.connect(&SecretString::from("bearer-token")).await?;
//! client.subscribe_to_order_updates("abc123")?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod realtime;
pub mod store;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable holding the message server endpoint.
pub const WS_URL_VAR: &str = "MARKETPLACE_WS_URL";

/// Endpoint used when [`WS_URL_VAR`] is unset.
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000/ws";
