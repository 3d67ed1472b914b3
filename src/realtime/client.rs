use std::sync::Arc;

use futures::Stream;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use url::Url;

use super::dispatch::Dispatcher;
use super::listeners::{ListenerId, ListenerRegistry};
use super::notifier::DesktopNotifier;
use super::types::request::OutboundMessage;
use super::types::response::MessageKind;
use crate::Result;
use crate::store::StateSink;
use crate::ws::config::{Config, endpoint_from_env, parse_endpoint};
use crate::ws::{ConnectionManager, ConnectionState, ConnectionStatus};

/// Query parameter carrying the bearer credential.
const TOKEN_PARAM: &str = "token";

/// Real-time client for the marketplace message server.
///
/// `Client` is a cheap handle: clones share the same connection, outbound queue
/// and listener registry. Create one per application and hand clones to the
/// code that needs it.
///
/// # Examples
///
/// ```rust, no_run
/// use std::sync::Arc;
///
/// use marketplace_realtime::realtime::{Client, MessageKind};
/// use marketplace_realtime::store::Store;
/// use marketplace_realtime::ws::config::Config;
/// use secrecy::SecretString;
///
/// # async fn example() -> marketplace_realtime::Result<()> {
/// let store = Arc::new(Store::default());
/// let client = Client::new("wss://realtime.example.com/ws", Config::default(), store.clone())?;
///
/// // Queued until the connection opens
/// client.join_room("vendor-42")?;
///
/// client.connect(&SecretString::from("bearer-token")).await?;
/// println!("{:?}", client.connection_status());
///
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Base endpoint, without credentials
    endpoint: Url,
    listeners: Arc<ListenerRegistry>,
    connection: ConnectionManager<Dispatcher>,
}

impl Client {
    /// Create a client for `endpoint` writing into `sink`. Nothing is opened until
    /// [`Client::connect`].
    pub fn new(endpoint: &str, config: Config, sink: Arc<dyn StateSink>) -> Result<Self> {
        Ok(Self::build(parse_endpoint(endpoint)?, config, sink, None))
    }

    /// Like [`Client::new`], additionally raising desktop notifications through
    /// `notifier`.
    pub fn with_notifier(
        endpoint: &str,
        config: Config,
        sink: Arc<dyn StateSink>,
        notifier: Arc<dyn DesktopNotifier>,
    ) -> Result<Self> {
        Ok(Self::build(
            parse_endpoint(endpoint)?,
            config,
            sink,
            Some(notifier),
        ))
    }

    /// Create a client for the endpoint named by [`crate::WS_URL_VAR`].
    pub fn from_env(config: Config, sink: Arc<dyn StateSink>) -> Result<Self> {
        Ok(Self::build(endpoint_from_env()?, config, sink, None))
    }

    fn build(
        endpoint: Url,
        config: Config,
        sink: Arc<dyn StateSink>,
        notifier: Option<Arc<dyn DesktopNotifier>>,
    ) -> Self {
        let listeners = Arc::new(ListenerRegistry::default());
        let dispatcher = Dispatcher::new(sink, notifier, Arc::clone(&listeners));
        let connection = ConnectionManager::new(config, dispatcher);

        Self {
            inner: Arc::new(ClientInner {
                endpoint,
                listeners,
                connection,
            }),
        }
    }

    /// The base endpoint, without credentials.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Connect using `credential` as the bearer token.
    ///
    /// Returns immediately if already connected, and waits for an attempt that
    /// is already in flight rather than starting a second one. A failure here is
    /// not retried.
    pub async fn connect(&self, credential: &SecretString) -> Result<()> {
        let mut url = self.inner.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(TOKEN_PARAM, credential.expose_secret());

        self.inner.connection.connect(url).await
    }

    /// Close the connection and cancel heartbeat and reconnection. Idempotent.
    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    /// Send `data` now, or queue it until the next open connection.
    ///
    /// # Errors
    ///
    /// Only if `data` cannot be serialized to JSON.
    pub fn send<R: Serialize>(&self, data: &R) -> Result<()> {
        self.inner.connection.send(data)
    }

    /// Register `listener` for messages of `kind`. It receives the message body.
    pub fn add_listener<F>(&self, kind: MessageKind, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.listeners.add(kind, listener)
    }

    /// Remove a listener. Removing an unknown listener is a no-op.
    pub fn remove_listener(&self, kind: MessageKind, id: ListenerId) {
        self.inner.listeners.remove(kind, id);
    }

    #[must_use]
    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.inner.listeners.count(kind)
    }

    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Number of messages waiting for the next open connection.
    #[must_use]
    pub fn queued_messages(&self) -> usize {
        self.inner.connection.queued()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.state_receiver()
    }

    /// Stream of connection state changes, starting with the next change.
    pub fn state_stream(&self) -> impl Stream<Item = ConnectionState> + use<> {
        let mut state_rx = self.state_receiver();

        async_stream::stream! {
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow_and_update();
                yield state;
            }
        }
    }

    pub fn join_room(&self, room: &str) -> Result<()> {
        self.send(&OutboundMessage::join_room(room))
    }

    pub fn leave_room(&self, room: &str) -> Result<()> {
        self.send(&OutboundMessage::leave_room(room))
    }

    pub fn subscribe_to_order_updates(&self, order_id: &str) -> Result<()> {
        self.send(&OutboundMessage::subscribe_order(order_id))
    }

    pub fn unsubscribe_from_order_updates(&self, order_id: &str) -> Result<()> {
        self.send(&OutboundMessage::unsubscribe_order(order_id))
    }
}
