use serde::Serialize;

/// Outbound envelopes understood by the message server.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    JoinRoom { room: String },
    LeaveRoom { room: String },
    Subscribe { resource: Resource, id: String },
    Unsubscribe { resource: Resource, id: String },
    Ping,
}

impl OutboundMessage {
    #[must_use]
    pub fn join_room(room: &str) -> Self {
        Self::JoinRoom {
            room: room.to_owned(),
        }
    }

    #[must_use]
    pub fn leave_room(room: &str) -> Self {
        Self::LeaveRoom {
            room: room.to_owned(),
        }
    }

    #[must_use]
    pub fn subscribe_order(order_id: &str) -> Self {
        Self::Subscribe {
            resource: Resource::Order,
            id: order_id.to_owned(),
        }
    }

    #[must_use]
    pub fn unsubscribe_order(order_id: &str) -> Self {
        Self::Unsubscribe {
            resource: Resource::Order,
            id: order_id.to_owned(),
        }
    }
}

/// Resources that can be followed with `subscribe`.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Order,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ws::connection::PING_FRAME;

    #[test]
    fn wire_format() {
        let cases = [
            (
                OutboundMessage::join_room("vendors"),
                json!({ "type": "join_room", "room": "vendors" }),
            ),
            (
                OutboundMessage::leave_room("vendors"),
                json!({ "type": "leave_room", "room": "vendors" }),
            ),
            (
                OutboundMessage::subscribe_order("abc123"),
                json!({ "type": "subscribe", "resource": "order", "id": "abc123" }),
            ),
            (
                OutboundMessage::unsubscribe_order("abc123"),
                json!({ "type": "unsubscribe", "resource": "order", "id": "abc123" }),
            ),
        ];

        for (message, expected) in cases {
            assert_eq!(serde_json::to_value(&message).unwrap(), expected);
        }
    }

    #[test]
    fn ping_matches_heartbeat_frame() {
        assert_eq!(
            serde_json::to_string(&OutboundMessage::Ping).unwrap(),
            PING_FRAME
        );
    }
}
