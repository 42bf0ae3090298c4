//! Event Listeners
//!
//! Listeners are registered per event name and are additive: registering the
//! same callback twice means it runs twice. Each registration gets its own
//! [`Subscription`] handle that can cancel just that registration.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Reserved event delivered when the connection opens. Payload is `null`.
pub const CONNECT_EVENT: &str = "connect";
/// Reserved event delivered when the connection ends. Payload is the reason.
pub const DISCONNECT_EVENT: &str = "disconnect";

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync + 'static>;

/// A message type with a fixed event name.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use socket_service::Event;
///
/// #[derive(Serialize, Deserialize)]
/// struct ChatMessage {
///     from: String,
///     text: String,
/// }
///
/// impl Event for ChatMessage {
///     const NAME: &'static str = "chat";
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned {
    const NAME: &'static str;
}

#[derive(Default)]
struct Listeners {
    by_event: HashMap<String, Vec<(u64, Listener)>>,
    next_id: u64,
}

/// All listeners registered on one connection.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<Listeners>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a listener, returning its registration id.
    pub fn add(&self, event: &str, listener: Listener) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .by_event
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one registration. Returns false if it was already gone.
    pub fn remove(&self, event: &str, id: u64) -> bool {
        let mut inner = self.lock();
        let Some(listeners) = inner.by_event.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            inner.by_event.remove(event);
        }
        removed
    }

    pub fn count(&self, event: &str) -> usize {
        self.lock().by_event.get(event).map_or(0, Vec::len)
    }

    /// Run every listener for `event` in registration order and return how
    /// many ran.
    ///
    /// The lock is released before any listener runs, so listeners may
    /// register or cancel other listeners.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let listeners: Vec<Listener> = self
            .lock()
            .by_event
            .get(event)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }
}

/// Handle to one listener registration.
///
/// Dropping the handle leaves the listener in place; call [`cancel`](Self::cancel)
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    event: String,
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new(event: &str, id: u64, registry: &Arc<ListenerRegistry>) -> Self {
        Self {
            event: event.to_string(),
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// A handle that is not attached to any registration.
    pub(crate) fn detached(event: &str) -> Self {
        Self {
            event: event.to_string(),
            id: u64::MAX,
            registry: Weak::new(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove this listener. Returns false if it was not registered anymore.
    pub fn cancel(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => {
                log::debug!("[Socket] cancelling listener for {}", self.event);
                registry.remove(&self.event, self.id)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let listener_count = count.clone();
        let listener: Listener = Arc::new(move |_: &Value| {
            listener_count.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn test_listeners_are_additive() {
        let registry = ListenerRegistry::new();
        let (count, listener) = counter();

        registry.add("x", listener.clone());
        registry.add("x", listener);

        assert_eq!(registry.dispatch("x", &json!(1)), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(registry.dispatch("y", &json!(1)), 0);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = seen.clone();
            registry.add(
                "x",
                Arc::new(move |payload: &Value| seen.lock().unwrap().push((n, payload.clone()))),
            );
        }

        registry.dispatch("x", &json!("p"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, json!("p")), (1, json!("p")), (2, json!("p"))]
        );
    }

    #[test]
    fn test_cancel_removes_only_that_subscription() {
        let registry = Arc::new(ListenerRegistry::new());
        let (count, listener) = counter();

        let first = Subscription::new("x", registry.add("x", listener.clone()), &registry);
        let _second = Subscription::new("x", registry.add("x", listener), &registry);
        assert_eq!(first.event(), "x");

        assert!(first.cancel());
        assert_eq!(registry.count("x"), 1);
        registry.dispatch("x", &Value::Null);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_after_registry_dropped() {
        let registry = Arc::new(ListenerRegistry::new());
        let (_, listener) = counter();
        let subscription = Subscription::new("x", registry.add("x", listener), &registry);
        drop(registry);
        assert!(!subscription.cancel());
        assert!(!Subscription::detached("x").cancel());
    }

    #[test]
    fn test_listener_can_register_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let inner = Arc::downgrade(&registry);
        registry.add(
            "x",
            Arc::new(move |_: &Value| {
                if let Some(registry) = inner.upgrade() {
                    registry.add("x", Arc::new(|_: &Value| {}));
                }
            }),
        );

        assert_eq!(registry.dispatch("x", &Value::Null), 1);
        assert_eq!(registry.count("x"), 2);
    }
}
