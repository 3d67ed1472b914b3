//! Core WebSocket infrastructure.
//!
//! This module provides the connection engine that the marketplace real-time
//! client is built on. It is agnostic of message formats: inbound text frames are
//! handed to a [`FrameHandler`].
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: connection lifecycle with outbound queueing, heartbeat,
//!   and reconnection with exponential backoff
//! - [`FrameHandler`]: trait receiving every inbound text frame
//! - [`config::Config`]: heartbeat and reconnection settings
//!
//! # Example
//!
//! ```ignore
//! let connection = ConnectionManager::new(Config::default(), MyHandler);
//! connection.connect(endpoint).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;

pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus, ReadyState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
