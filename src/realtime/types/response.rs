use std::fmt;
use std::str::FromStr;

use phf::phf_map;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::store::{DEFAULT_NOTIFICATION_KIND, Notification};

/// Human phrases for order statuses, completing "Order #<id> ...".
static ORDER_STATUS_PHRASES: phf::Map<&'static str, &'static str> = phf_map! {
    "pending" => "is pending",
    "confirmed" => "has been confirmed",
    "processing" => "is being processed",
    "shipped" => "has been shipped",
    "delivered" => "has been delivered",
    "cancelled" => "has been cancelled",
    "refunded" => "has been refunded",
};

const ORDER_UPDATE_TITLE: &str = "Order Update";

/// Top-level inbound message wrapper.
///
/// Every frame is `{"type": ..., "payload": ...}`. Some server messages put their
/// fields next to `type` instead of under `payload`; those fields are kept in
/// [`InboundEnvelope::fields`] and become the body.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    /// Message type discriminator
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: Option<Value>,
    /// Any other top-level fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl InboundEnvelope {
    /// The known kind of this message, if any.
    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        self.msg_type.parse().ok()
    }

    /// The message body: `payload` if present, otherwise the remaining top-level fields.
    #[must_use]
    pub fn into_body(self) -> Value {
        self.payload.unwrap_or(Value::Object(self.fields))
    }
}

/// Inbound message types the client understands.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    OrderUpdate,
    Notification,
    ListingUpdate,
    UserStatus,
    Pong,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::OrderUpdate,
        MessageKind::Notification,
        MessageKind::ListingUpdate,
        MessageKind::UserStatus,
        MessageKind::Pong,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderUpdate => "order_update",
            Self::Notification => "notification",
            Self::ListingUpdate => "listing_update",
            Self::UserStatus => "user_status",
            Self::Pong => "pong",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown message type `{s}`")))
    }
}

/// Body of an `order_update` message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub status: String,
    /// Any additional order fields sent by the server
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderUpdate {
    /// "Order #<id> has been delivered", falling back to
    /// "Order #<id> status updated to <status>" for statuses without a phrase.
    #[must_use]
    pub fn message(&self) -> String {
        match ORDER_STATUS_PHRASES.get(self.status.as_str()) {
            Some(phrase) => format!("Order #{} {phrase}", self.order_id),
            None => format!("Order #{} status updated to {}", self.order_id, self.status),
        }
    }

    #[must_use]
    pub fn to_notification(&self) -> Notification {
        Notification::builder()
            .title(ORDER_UPDATE_TITLE)
            .message(self.message())
            .data(serde_json::json!({
                "orderId": self.order_id,
                "status": self.status,
            }))
            .build()
    }
}

/// Body of a `notification` message.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl NotificationPayload {
    #[must_use]
    pub fn into_notification(self) -> Notification {
        let kind = self
            .kind
            .unwrap_or_else(|| DEFAULT_NOTIFICATION_KIND.to_owned());

        match self.id {
            Some(id) => Notification::builder()
                .id(id)
                .kind(kind)
                .title(self.title)
                .message(self.message)
                .maybe_data(self.data)
                .build(),
            None => Notification::builder()
                .kind(kind)
                .title(self.title)
                .message(self.message)
                .maybe_data(self.data)
                .build(),
        }
    }
}
