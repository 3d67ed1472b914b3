//! Application state written by the real-time client.
//!
//! The client only depends on [`StateSink`]. [`Store`] is the in-memory
//! implementation used by the application: it tracks the latest status of every
//! order it has heard about and a bounded, newest-first list of user-facing
//! notifications.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use bon::Builder;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::realtime::types::response::OrderUpdate;

/// Maximum number of notifications kept by [`Store`].
pub const MAX_NOTIFICATIONS: usize = 50;

/// Receiver of the state changes produced by inbound messages.
pub trait StateSink: Send + Sync + 'static {
    /// Record the new status of an order.
    fn update_order_status(&self, update: &OrderUpdate);

    /// Append a user-facing notification.
    fn push_notification(&self, notification: Notification);
}

/// A user-facing notification.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-provided id, or a generated UUID
    #[builder(into, default = Uuid::new_v4().to_string())]
    pub id: String,
    /// Severity, e.g. `info`, `success`, `warning`, `error`
    #[serde(rename = "type")]
    #[builder(into, default = DEFAULT_NOTIFICATION_KIND.to_owned())]
    pub kind: String,
    #[builder(into)]
    pub title: String,
    #[builder(into)]
    pub message: String,
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    #[builder(default)]
    pub read: bool,
    /// Arbitrary data attached by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Notification severity used when the server does not send one.
pub const DEFAULT_NOTIFICATION_KIND: &str = "info";

/// In-memory application state.
#[derive(Debug, Default)]
pub struct Store {
    orders: DashMap<String, OrderUpdate>,
    notifications: RwLock<VecDeque<Notification>>,
}

impl Store {
    /// Latest status recorded for `order_id`.
    #[must_use]
    pub fn order_status(&self, order_id: &str) -> Option<String> {
        self.orders.get(order_id).map(|entry| entry.status.clone())
    }

    /// Snapshot of every order update, keyed by order id.
    #[must_use]
    pub fn orders(&self) -> HashMap<String, OrderUpdate> {
        self.orders
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Snapshot of the notifications, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.read_notifications().iter().cloned().collect()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.read_notifications()
            .iter()
            .filter(|notification| !notification.read)
            .count()
    }

    /// Mark one notification as read. Returns `false` if no notification has `id`.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut notifications = self.write_notifications();
        match notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        for notification in self.write_notifications().iter_mut() {
            notification.read = true;
        }
    }

    /// Remove one notification. Returns `false` if no notification has `id`.
    pub fn remove_notification(&self, id: &str) -> bool {
        let mut notifications = self.write_notifications();
        let before = notifications.len();
        notifications.retain(|n| n.id != id);
        notifications.len() != before
    }

    pub fn clear_notifications(&self) {
        self.write_notifications().clear();
    }

    // A poisoned lock still holds a valid list; recover it.
    fn read_notifications(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<Notification>> {
        self.notifications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_notifications(&self) -> std::sync::RwLockWriteGuard<'_, VecDeque<Notification>> {
        self.notifications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateSink for Store {
    fn update_order_status(&self, update: &OrderUpdate) {
        self.orders.insert(update.order_id.clone(), update.clone());
    }

    fn push_notification(&self, notification: Notification) {
        let mut notifications = self.write_notifications();
        notifications.push_front(notification);
        notifications.truncate(MAX_NOTIFICATIONS);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn notification(title: &str) -> Notification {
        Notification::builder()
            .title(title)
            .message("body")
            .build()
    }

    #[test]
    fn builder_defaults() {
        let notification = notification("T");

        assert_eq!(notification.kind, "info");
        assert!(!notification.read);
        assert!(notification.data.is_none());
        assert!(Uuid::parse_str(&notification.id).is_ok());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let notification = Notification::builder()
            .id("n-1")
            .kind("success")
            .title("T")
            .message("M")
            .data(json!({ "orderId": "abc" }))
            .build();

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["id"], "n-1");
        assert_eq!(value["type"], "success");
        assert_eq!(value["read"], false);
        assert_eq!(value["data"]["orderId"], "abc");
    }

    #[test]
    fn notifications_are_newest_first_and_bounded() {
        let store = Store::default();
        for i in 0..(MAX_NOTIFICATIONS + 5) {
            store.push_notification(notification(&format!("n{i}")));
        }

        let notifications = store.notifications();
        assert_eq!(notifications.len(), MAX_NOTIFICATIONS);
        assert_eq!(
            notifications[0].title,
            format!("n{}", MAX_NOTIFICATIONS + 4)
        );
        assert_eq!(notifications[MAX_NOTIFICATIONS - 1].title, "n5");
    }

    #[test]
    fn read_bookkeeping() {
        let store = Store::default();
        store.push_notification(notification("a"));
        store.push_notification(notification("b"));
        assert_eq!(store.unread_count(), 2);

        let id = store.notifications()[0].id.clone();
        assert!(store.mark_read(&id));
        assert!(!store.mark_read("missing"));
        assert_eq!(store.unread_count(), 1);

        store.mark_all_read();
        assert_eq!(store.unread_count(), 0);

        assert!(store.remove_notification(&id));
        assert!(!store.remove_notification(&id));
        assert_eq!(store.notifications().len(), 1);

        store.clear_notifications();
        assert!(store.notifications().is_empty());
    }

    #[test]
    fn order_status_keeps_latest() {
        let store = Store::default();
        let first: OrderUpdate =
            serde_json::from_value(json!({ "orderId": "abc123", "status": "shipped" })).unwrap();
        let second: OrderUpdate =
            serde_json::from_value(json!({ "orderId": "abc123", "status": "delivered" }))
                .unwrap();

        store.update_order_status(&first);
        store.update_order_status(&second);

        assert_eq!(store.order_status("abc123").as_deref(), Some("delivered"));
        assert_eq!(store.orders().len(), 1);
        assert!(store.order_status("other").is_none());
    }
}
