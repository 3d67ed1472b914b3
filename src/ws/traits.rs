//! Core traits for the WebSocket connection engine.

/// Receives every text frame read from an open connection.
///
/// The connection engine knows nothing about message formats; it hands each
/// frame to the handler in the order the frames arrive. Implementations must not
/// panic or block: they run inside the connection's read loop.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// impl FrameHandler for Echo {
///     fn handle_text(&self, text: &str) {
///         println!("{text}");
///     }
/// }
/// ```
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle a single inbound text frame.
    fn handle_text(&self, text: &str);
}
