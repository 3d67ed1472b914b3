use std::sync::Arc;

use serde_json::Value;

use super::listeners::ListenerRegistry;
use super::notifier::{DesktopNotifier, Permission};
use super::types::response::{InboundEnvelope, MessageKind, NotificationPayload, OrderUpdate};
use crate::store::{Notification, StateSink};
use crate::ws::{FrameHandler, WsError};

/// Routes inbound frames to the state sink, the desktop notifier and the
/// registered listeners.
pub struct Dispatcher {
    sink: Arc<dyn StateSink>,
    notifier: Option<Arc<dyn DesktopNotifier>>,
    listeners: Arc<ListenerRegistry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        sink: Arc<dyn StateSink>,
        notifier: Option<Arc<dyn DesktopNotifier>>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            sink,
            notifier,
            listeners,
        }
    }

    /// Dispatch one already-parsed envelope.
    pub fn dispatch(&self, envelope: InboundEnvelope) {
        let Some(kind) = envelope.kind() else {
            #[cfg(feature = "tracing")]
            tracing::warn!(msg_type = %envelope.msg_type, "Unknown message type");
            return;
        };

        let body = envelope.into_body();
        match kind {
            MessageKind::OrderUpdate => self.on_order_update(&body),
            MessageKind::Notification => self.on_notification(&body),
            MessageKind::ListingUpdate | MessageKind::UserStatus => {}
            MessageKind::Pong => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Heartbeat acknowledged");
            }
        }

        self.listeners.notify(kind, &body);
    }

    fn on_order_update(&self, body: &Value) {
        match serde_json::from_value::<OrderUpdate>(body.clone()) {
            Ok(update) => {
                self.sink.update_order_status(&update);
                self.sink.push_notification(update.to_notification());
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Malformed order_update body");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
    }

    fn on_notification(&self, body: &Value) {
        let notification = match serde_json::from_value::<NotificationPayload>(body.clone()) {
            Ok(payload) => payload.into_notification(),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Malformed notification body");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return;
            }
        };

        self.show_desktop(&notification);
        self.sink.push_notification(notification);
    }

    fn show_desktop(&self, notification: &Notification) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if notifier.permission() != Permission::Granted {
            return;
        }

        if let Err(e) = notifier.show(&notification.title, &notification.message) {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Unable to show desktop notification");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }
}

impl FrameHandler for Dispatcher {
    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<InboundEnvelope>(text) {
            Ok(envelope) => self.dispatch(envelope),
            Err(e) => {
                let error = WsError::MessageParse(e);
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %error, "Failed to parse WebSocket message");
                #[cfg(not(feature = "tracing"))]
                let _ = (&text, &error);
            }
        }
    }
}
