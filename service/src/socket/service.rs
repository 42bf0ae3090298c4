//! The shared connection.

use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use crate::socket::events::{CONNECT_EVENT, DISCONNECT_EVENT, Event, ListenerRegistry, Subscription};
use crate::socket::transport::{AckCallback, EventSink, Transport, TransportEvent};
use crate::socket::websocket::WebSocketTransport;
use crate::socket::{SocketConfig, SocketError};

static GLOBAL: OnceCell<SocketService> = OnceCell::new();

/// Connection state shared with the transport thread.
struct Shared {
    connected: AtomicBool,
    listeners: Arc<ListenerRegistry>,
}

impl EventSink for Shared {
    fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connect => {
                self.connected.store(true, Ordering::SeqCst);
                log::info!("[Socket] connected");
                self.listeners.dispatch(CONNECT_EVENT, &Value::Null);
            }
            TransportEvent::Disconnect { reason } => {
                self.connected.store(false, Ordering::SeqCst);
                log::info!("[Socket] disconnected: {}", reason);
                self.listeners
                    .dispatch(DISCONNECT_EVENT, &Value::String(reason));
            }
            TransportEvent::Message { event, payload } => {
                if self.listeners.dispatch(&event, &payload) == 0 {
                    log::debug!("[Socket] no listeners for {}", event);
                }
            }
        }
    }
}

/// A real-time connection with `emit`/`listen`.
///
/// Cloning is cheap and every clone shares the same connection, flag and
/// listeners.
#[derive(Clone)]
pub struct SocketService {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    user: Option<Value>,
}

impl SocketService {
    /// Open a WebSocket connection to the configured server.
    ///
    /// Returns immediately. Connection failures are only logged and leave
    /// [`is_connected`](Self::is_connected) false.
    pub fn connect(config: SocketConfig) -> Self {
        Self::with_transport(|sink| Arc::new(WebSocketTransport::connect(config, sink)))
    }

    /// Build a service on top of any transport. `connect` receives the sink
    /// the transport must report to.
    pub fn with_transport<T, F>(connect: F) -> Self
    where
        T: Transport,
        F: FnOnce(Arc<dyn EventSink>) -> Arc<T>,
    {
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            listeners: Arc::new(ListenerRegistry::new()),
        });
        let sink: Arc<dyn EventSink> = shared.clone();
        let transport: Arc<dyn Transport> = connect(sink);

        Self {
            transport,
            shared,
            user: None,
        }
    }

    /// The process-wide instance, created on first use from
    /// [`SocketConfig::from_env`].
    pub fn global() -> &'static SocketService {
        GLOBAL.get_or_init(|| {
            log::info!("[Socket] creating global connection");
            SocketService::connect(SocketConfig::from_env())
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Always `None`; reserved for session data.
    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    /// Whether both handles share one connection.
    pub fn same_connection(&self, other: &SocketService) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Send an event.
    ///
    /// `callback` runs once the server acknowledges the event. Nothing is
    /// sent while disconnected and no error is reported.
    pub fn emit(&self, event: &str, payload: Option<Value>, callback: Option<AckCallback>) {
        log::info!("[Socket] emitting... {}", event);
        if event.is_empty() {
            log::warn!("[Socket] refusing to emit an event without a name");
            return;
        }

        match self.transport.emit(event, payload, callback) {
            Ok(()) => {}
            Err(SocketError::NotConnected) => {
                log::debug!("[Socket] not connected, dropped {}", event);
            }
            Err(e) => log::warn!("[Socket] failed to emit {}: {}", event, e),
        }
    }

    /// Send a typed event.
    pub fn emit_event<E: Event>(&self, event: &E) {
        match serde_json::to_value(event) {
            Ok(payload) => self.emit(E::NAME, Some(payload), None),
            Err(e) => log::error!("[Socket] failed to encode {}: {}", E::NAME, e),
        }
    }

    /// Run `callback` with the payload of every inbound `event`.
    ///
    /// Registrations are additive. The listener stays registered until the
    /// returned [`Subscription`] is cancelled.
    pub fn listen<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        log::info!("[Socket] listening... {}", event);
        if event.is_empty() {
            log::warn!("[Socket] refusing to listen for an event without a name");
            return Subscription::detached(event);
        }

        let id = self.shared.listeners.add(event, Arc::new(callback));
        Subscription::new(event, id, &self.shared.listeners)
    }

    /// Listen for a typed event. Payloads that do not decode are skipped.
    pub fn listen_event<E, F>(&self, callback: F) -> Subscription
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.listen(E::NAME, move |payload: &Value| match <E as Deserialize>::deserialize(payload) {
            Ok(event) => callback(event),
            Err(e) => log::warn!("[Socket] skipping malformed {}: {}", E::NAME, e),
        })
    }

    /// Close the connection. A disconnect follows.
    pub fn close(&self) {
        log::info!("[Socket] closing");
        self.transport.close();
    }

    /// Close the connection and block until the disconnect arrives.
    ///
    /// Returns false if `timeout` passed first.
    pub fn close_and_wait(&self, timeout: Duration) -> bool {
        if !self.is_connected() {
            return true;
        }

        let (tx, rx) = mpsc::channel();
        let subscription = self.listen(DISCONNECT_EVENT, move |_| {
            let _ = tx.send(());
        });
        self.close();
        let closed = rx.recv_timeout(timeout).is_ok() || !self.is_connected();
        subscription.cancel();
        closed
    }
}
