use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;

use super::types::response::MessageKind;

/// Callback invoked with the body of a matching message.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::add`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners grouped by message kind, each group in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: DashMap<MessageKind, Vec<(ListenerId, Listener)>>,
}

impl ListenerRegistry {
    pub fn add<F>(&self, kind: MessageKind, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` is not registered for `kind`.
    pub fn remove(&self, kind: MessageKind, id: ListenerId) -> bool {
        let Some(mut entry) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(existing, _)| *existing != id);
        entry.len() != before
    }

    #[must_use]
    pub fn count(&self, kind: MessageKind) -> usize {
        self.listeners.get(&kind).map_or(0, |entry| entry.len())
    }

    /// Call every listener registered for `kind` with `payload`.
    ///
    /// Listeners run on a snapshot taken before the first call, so a listener may
    /// add or remove listeners. A panicking listener is logged and skipped.
    pub fn notify(&self, kind: MessageKind, payload: &Value) {
        let snapshot: Vec<Listener> = self
            .listeners
            .get(&kind)
            .map(|entry| entry.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                #[cfg(feature = "tracing")]
                tracing::error!(%kind, panic = panic_message(&*panic), "Listener panicked");
                #[cfg(not(feature = "tracing"))]
                let _ = panic_message(&*panic);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
