#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::traits::FrameHandler;
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Heartbeat frame sent while the connection is open.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

const CLIENT_CLOSE_REASON: &str = "Client disconnect";

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, and no reconnection is scheduled
    Idle,
    /// Attempting to open a transport
    Connecting,
    /// Successfully connected
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the backoff delay before the next reconnection attempt
    Reconnecting {
        /// Current reconnection attempt number, starting at 1
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Transport-level view of the state.
    #[must_use]
    pub const fn ready_state(self) -> ReadyState {
        match self {
            Self::Connecting => ReadyState::Connecting,
            Self::Open { .. } => ReadyState::Open,
            Self::Idle | Self::Reconnecting { .. } => ReadyState::Closed,
        }
    }
}

/// Readiness of the underlying transport.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// A transport is being opened
    Connecting,
    /// Frames are written immediately
    Open,
    /// No transport; frames are queued
    Closed,
}

/// Snapshot returned by [`ConnectionManager::status`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether a connection is open
    pub connected: bool,
    /// Transport readiness
    pub ready_state: ReadyState,
    /// Reconnection attempts made since the last successful open
    pub reconnect_attempts: u32,
}

/// How a connection's message loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    /// `disconnect` cancelled the cycle
    Manual,
    /// The server closed with a normal-closure code
    Normal,
    /// Any other close, a transport error, or the stream ending
    Abnormal,
}

/// Everything guarded by the session lock. State transitions published on the
/// watch channel happen while this lock is held.
#[derive(Default)]
struct Session {
    /// Endpoint, including credentials, of the current cycle
    url: Option<Url>,
    /// Cancels every task and timer armed by the current cycle
    cycle: Option<CancellationToken>,
    /// Writer channel of the open connection, if any
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Frames waiting for the next open connection, oldest first
    queue: VecDeque<String>,
    reconnect_attempts: u32,
}

struct Inner<H> {
    config: Config,
    handler: H,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<H: FrameHandler> Inner<H> {
    // Recovering from poison is sound: every mutation of `Session` leaves it consistent.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        #[cfg(feature = "tracing")]
        if changed {
            tracing::debug!(?state, "Connection state changed");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = changed;
    }

    /// Promote a freshly opened transport to `Open`: flush the queue into a new
    /// writer channel and reset the reconnect counter.
    ///
    /// Returns `None` if `cycle` was cancelled while the transport was opening.
    fn open(&self, cycle: &CancellationToken) -> Option<mpsc::UnboundedReceiver<String>> {
        let mut session = self.session();
        if cycle.is_cancelled() {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        #[cfg(feature = "tracing")]
        if !session.queue.is_empty() {
            tracing::debug!(count = session.queue.len(), "Flushing queued messages");
        }
        for frame in session.queue.drain(..) {
            // The receiver is alive, so this cannot fail
            _ = tx.send(frame);
        }

        session.outbound = Some(tx);
        session.reconnect_attempts = 0;
        self.set_state(ConnectionState::Open {
            since: Instant::now(),
        });

        Some(rx)
    }

    /// Detach the writer channel of a finished connection and put any frames it
    /// never wrote back at the front of the queue.
    ///
    /// Once `cycle` is cancelled the session's writer, if any, belongs to a newer
    /// cycle: it is left in place and the unwritten frames are handed to it.
    fn detach(
        &self,
        cycle: &CancellationToken,
        unsent: Option<String>,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    ) {
        let mut guard = self.session();
        let session = &mut *guard;

        let mut pending: Vec<String> = unsent.into_iter().collect();
        while let Ok(frame) = outbound_rx.try_recv() {
            pending.push(frame);
        }

        if !cycle.is_cancelled() {
            session.outbound = None;
        }

        if let Some(tx) = &session.outbound {
            for frame in pending {
                if let Err(mpsc::error::SendError(frame)) = tx.send(frame) {
                    session.queue.push_back(frame);
                }
            }
            return;
        }

        for frame in pending.into_iter().rev() {
            session.queue.push_front(frame);
        }
    }

    /// End the cycle without reconnecting.
    fn finish(&self, cycle: &CancellationToken) {
        let mut session = self.session();
        if cycle.is_cancelled() {
            return;
        }
        session.cycle = None;
        self.set_state(ConnectionState::Idle);
    }
}

/// Manages the WebSocket connection lifecycle, reconnection, and heartbeat.
///
/// The manager runs one connection *cycle* at a time. A cycle starts with
/// [`ConnectionManager::connect`] and ends with [`ConnectionManager::disconnect`],
/// a normal close from the server, or exhaustion of the reconnection budget.
/// Within a cycle:
/// - Frames sent while no connection is open are queued and flushed, in order,
///   the moment a connection opens
/// - A heartbeat frame is written every `heartbeat_interval` while open
/// - Any close other than a normal closure triggers reconnection with
///   exponential backoff, bounded by `max_attempts`
///
/// Every inbound text frame is handed to the [`FrameHandler`].
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new(Config::default(), handler);
/// connection.connect(url).await?;
/// connection.send(&serde_json::json!({ "type": "join_room", "room": "vendors" }))?;
/// ```
pub struct ConnectionManager<H: FrameHandler> {
    inner: Arc<Inner<H>>,
}

impl<H: FrameHandler> Clone for ConnectionManager<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: FrameHandler> ConnectionManager<H> {
    /// Create an idle connection manager. Nothing is opened until [`Self::connect`].
    #[must_use]
    pub fn new(config: Config, handler: H) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                session: Mutex::new(Session::default()),
                state_tx,
            }),
        }
    }

    /// Open a connection to `url`.
    ///
    /// Returns immediately if a connection is already open. If another call is
    /// already opening a transport, waits for that attempt instead of opening a
    /// second one. A failure is returned to the caller and is not retried;
    /// reconnection only follows the loss of a connection that was open.
    pub async fn connect(&self, url: Url) -> Result<()> {
        let cycle = {
            let mut session = self.inner.session();
            match self.inner.state() {
                ConnectionState::Open { .. } => return Ok(()),
                ConnectionState::Connecting => None,
                ConnectionState::Idle | ConnectionState::Reconnecting { .. } => {
                    if let Some(previous) = session.cycle.take() {
                        previous.cancel();
                    }
                    let cycle = CancellationToken::new();
                    session.cycle = Some(cycle.clone());
                    session.url = Some(url.clone());
                    session.reconnect_attempts = 0;
                    self.inner.set_state(ConnectionState::Connecting);
                    Some(cycle)
                }
            }
        };

        let Some(cycle) = cycle else {
            return self.wait_for_pending().await;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(host = url.host_str(), path = url.path(), "Connecting");

        let result = tokio::select! {
            () = cycle.cancelled() => Err(WsError::Cancelled),
            result = connect_async(url.as_str()) => result.map_err(WsError::Connection),
        };

        match result {
            Ok((stream, _)) => {
                let outbound_rx = self.inner.open(&cycle).ok_or(WsError::Cancelled)?;
                tokio::spawn(Self::drive(
                    Arc::clone(&self.inner),
                    cycle,
                    stream,
                    outbound_rx,
                ));
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to connect");
                self.inner.finish(&cycle);
                Err(e.into())
            }
        }
    }

    async fn wait_for_pending(&self) -> Result<()> {
        let mut state_rx = self.inner.state_tx.subscribe();
        let state = *state_rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map_err(|_e| WsError::ConnectionClosed)?;

        if state.is_connected() {
            Ok(())
        } else {
            Err(WsError::ConnectFailed.into())
        }
    }

    /// Close the connection with a normal-closure code and cancel the heartbeat
    /// and any pending reconnection. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        let mut session = self.inner.session();
        if let Some(cycle) = session.cycle.take() {
            cycle.cancel();
        }
        session.outbound = None;
        self.inner.set_state(ConnectionState::Idle);
    }

    /// Serialize and send `request`, or queue it until the next open connection.
    ///
    /// The only error is a serialization failure; a closed connection is not an
    /// error.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.send_text(json);
        Ok(())
    }

    /// Send a raw text frame, or queue it until the next open connection.
    pub fn send_text(&self, text: String) {
        let mut guard = self.inner.session();
        let session = &mut *guard;

        match &session.outbound {
            Some(tx) => {
                if let Err(mpsc::error::SendError(text)) = tx.send(text) {
                    session.queue.push_back(text);
                }
            }
            None => session.queue.push_back(text),
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Connection flag, transport readiness and reconnect counter.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let session = self.inner.session();
        let state = self.inner.state();

        ConnectionStatus {
            connected: state.is_connected(),
            ready_state: state.ready_state(),
            reconnect_attempts: session.reconnect_attempts,
        }
    }

    /// Number of frames waiting for the next open connection.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.session().queue.len()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Runs a cycle's connections until the cycle ends.
    async fn drive(
        inner: Arc<Inner<H>>,
        cycle: CancellationToken,
        mut stream: WsStream,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
    ) {
        let mut backoff: ExponentialBackoff = inner.config.reconnect.clone().into();

        loop {
            let closed = Self::handle_connection(&inner, &cycle, stream, &mut outbound_rx).await;

            match closed {
                Closed::Manual => return,
                Closed::Normal => {
                    inner.finish(&cycle);
                    return;
                }
                Closed::Abnormal => {}
            }

            match Self::reconnect(&inner, &cycle, &mut backoff).await {
                Some((next_stream, next_rx)) => {
                    stream = next_stream;
                    outbound_rx = next_rx;
                    backoff.reset();
                }
                None => return,
            }
        }
    }

    /// Handle an active WebSocket connection until it closes.
    async fn handle_connection(
        inner: &Inner<H>,
        cycle: &CancellationToken,
        stream: WsStream,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    ) -> Closed {
        let (mut write, mut read) = stream.split();

        let heartbeat = cycle.child_token();
        let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::heartbeat_loop(
            ping_tx,
            heartbeat.clone(),
            inner.config.heartbeat_interval,
        ));

        let mut unsent = None;
        let closed = loop {
            tokio::select! {
                () = cycle.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: CLIENT_CLOSE_REASON.into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %e, "Unable to send close frame");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                    break Closed::Manual;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(text = %text.as_str(), "Received WebSocket text message");
                            inner.handler.handle_text(text.as_str());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| f.code);
                            #[cfg(feature = "tracing")]
                            tracing::debug!(?code, "Server closed the connection");
                            if code == Some(CloseCode::Normal) {
                                break Closed::Normal;
                            }
                            break Closed::Abnormal;
                        }
                        Some(Ok(_)) => {
                            // Binary frames are not part of the protocol; control frames are handled by tungstenite
                        }
                        Some(Err(e)) => {
                            #[cfg(feature = "tracing")]
                            tracing::error!(error = %e, "WebSocket transport error");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &e;
                            break Closed::Abnormal;
                        }
                        None => break Closed::Abnormal,
                    }
                }

                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = write.send(Message::Text(text.clone().into())).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(error = %e, "Unable to write frame, requeueing");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                        unsent = Some(text);
                        break Closed::Abnormal;
                    }
                }

                Some(()) = ping_rx.recv() => {
                    if write.send(Message::Text(PING_FRAME.into())).await.is_err() {
                        break Closed::Abnormal;
                    }
                }
            }
        };

        heartbeat.cancel();
        inner.detach(cycle, unsent, outbound_rx);

        closed
    }

    /// Heartbeat loop that asks the message loop to write a ping every `period`.
    async fn heartbeat_loop(
        ping_tx: mpsc::UnboundedSender<()>,
        token: CancellationToken,
        period: Duration,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if ping_tx.send(()).is_err() {
                        // Message loop has terminated
                        break;
                    }
                }
            }
        }
    }

    /// Reconnect with exponential backoff until a connection opens, the cycle is
    /// cancelled, or the attempt budget is spent.
    async fn reconnect(
        inner: &Inner<H>,
        cycle: &CancellationToken,
        backoff: &mut ExponentialBackoff,
    ) -> Option<(WsStream, mpsc::UnboundedReceiver<String>)> {
        loop {
            let (url, delay) = {
                let mut session = inner.session();
                if cycle.is_cancelled() {
                    return None;
                }

                if let Some(max) = inner.config.reconnect.max_attempts
                    && session.reconnect_attempts >= max
                {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempts = session.reconnect_attempts,
                        "Giving up reconnecting"
                    );
                    session.cycle = None;
                    inner.set_state(ConnectionState::Idle);
                    return None;
                }

                session.reconnect_attempts = session.reconnect_attempts.saturating_add(1);
                let attempt = session.reconnect_attempts;
                inner.set_state(ConnectionState::Reconnecting { attempt });

                let delay = backoff
                    .next_backoff()
                    .unwrap_or(inner.config.reconnect.max_backoff);
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, ?delay, "Scheduling reconnection");

                (session.url.clone()?, delay)
            };

            tokio::select! {
                () = cycle.cancelled() => return None,
                () = sleep(delay) => {}
            }

            {
                let _session = inner.session();
                if cycle.is_cancelled() {
                    return None;
                }
                inner.set_state(ConnectionState::Connecting);
            }

            let result = tokio::select! {
                () = cycle.cancelled() => return None,
                result = connect_async(url.as_str()) => result,
            };

            match result {
                Ok((stream, _)) => {
                    let outbound_rx = inner.open(cycle)?;
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Reconnected");
                    return Some((stream, outbound_rx));
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Reconnection attempt failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Discard;

    impl FrameHandler for Discard {
        fn handle_text(&self, _text: &str) {}
    }

    #[test]
    fn ready_state_follows_connection_state() {
        assert_eq!(ConnectionState::Idle.ready_state(), ReadyState::Closed);
        assert_eq!(
            ConnectionState::Connecting.ready_state(),
            ReadyState::Connecting
        );
        assert_eq!(
            ConnectionState::Open {
                since: Instant::now()
            }
            .ready_state(),
            ReadyState::Open
        );
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.ready_state(),
            ReadyState::Closed
        );
    }

    #[test]
    fn send_while_idle_queues_in_order() {
        let connection = ConnectionManager::new(Config::default(), Discard);

        connection.send(&serde_json::json!({ "n": 1 })).unwrap();
        connection.send_text(r#"{"n":2}"#.to_owned());

        assert_eq!(connection.queued(), 2);
        let session = connection.inner.session();
        assert_eq!(session.queue[0], r#"{"n":1}"#);
        assert_eq!(session.queue[1], r#"{"n":2}"#);
    }

    #[test]
    fn disconnect_when_idle_is_noop() {
        let connection = ConnectionManager::new(Config::default(), Discard);

        connection.disconnect();
        connection.disconnect();

        let status = connection.status();
        assert!(!status.connected);
        assert_eq!(status.ready_state, ReadyState::Closed);
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(connection.state(), ConnectionState::Idle);
    }

    #[test]
    fn detach_requeues_unsent_frames_first() {
        let connection = ConnectionManager::new(Config::default(), Discard);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send("b".to_owned()).unwrap();
        tx.send("c".to_owned()).unwrap();
        connection.inner.session().queue.push_back("d".to_owned());

        connection
            .inner
            .detach(&CancellationToken::new(), Some("a".to_owned()), &mut rx);

        let session = connection.inner.session();
        let queue: Vec<&str> = session.queue.iter().map(String::as_str).collect();
        assert_eq!(queue, vec!["a", "b", "c", "d"]);
        assert!(session.outbound.is_none());
    }

    #[test]
    fn detach_from_cancelled_cycle_keeps_newer_writer() {
        let connection = ConnectionManager::new(Config::default(), Discard);
        let stale = CancellationToken::new();
        stale.cancel();

        let (current_tx, mut current_rx) = mpsc::unbounded_channel();
        connection.inner.session().outbound = Some(current_tx);
        let (stale_tx, mut stale_rx) = mpsc::unbounded_channel();
        stale_tx.send("b".to_owned()).unwrap();

        connection
            .inner
            .detach(&stale, Some("a".to_owned()), &mut stale_rx);

        assert!(connection.inner.session().outbound.is_some());
        assert_eq!(connection.queued(), 0);
        assert_eq!(current_rx.try_recv().unwrap(), "a");
        assert_eq!(current_rx.try_recv().unwrap(), "b");

        // Later sends still reach the newer writer
        connection.send_text("c".to_owned());
        assert_eq!(current_rx.try_recv().unwrap(), "c");
        assert_eq!(connection.queued(), 0);
    }

    #[tokio::test]
    async fn heartbeat_does_not_burst_after_stall() {
        let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        tokio::spawn(ConnectionManager::<Discard>::heartbeat_loop(
            ping_tx,
            token.clone(),
            Duration::from_millis(50),
        ));
        sleep(Duration::from_millis(10)).await;

        // Block the runtime for several periods
        std::thread::sleep(Duration::from_millis(300));
        sleep(Duration::from_millis(20)).await;

        let mut pings = 0;
        while ping_rx.try_recv().is_ok() {
            pings += 1;
        }
        token.cancel();
        assert!(pings <= 2, "missed ticks were replayed: {pings} pings");
    }

    #[test]
    fn detach_from_cancelled_cycle_requeues_while_closed() {
        let connection = ConnectionManager::new(Config::default(), Discard);
        let stale = CancellationToken::new();
        stale.cancel();
        connection.inner.session().queue.push_back("c".to_owned());
        let (_stale_tx, mut stale_rx) = mpsc::unbounded_channel();

        connection
            .inner
            .detach(&stale, Some("a".to_owned()), &mut stale_rx);

        let session = connection.inner.session();
        let queue: Vec<&str> = session.queue.iter().map(String::as_str).collect();
        assert_eq!(queue, vec!["a", "c"]);
        assert!(session.outbound.is_none());
    }
}
