//! WebSocket transport.
//!
//! Each connection runs on its own thread with a dedicated tokio runtime, so
//! callers never need a runtime of their own. Outbound frames go through an
//! unbounded channel to a writer task; the reader loop decodes inbound frames
//! and pushes them to the [`EventSink`].

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::socket::protocol::Frame;
use crate::socket::transport::{AckCallback, EventSink, Transport, TransportEvent};
use crate::socket::{Result, SocketConfig, SocketError};

/// WebSocket ready states (matching browser API)
pub const WS_CONNECTING: u32 = 0;
pub const WS_OPEN: u32 = 1;
pub const WS_CLOSING: u32 = 2;
pub const WS_CLOSED: u32 = 3;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static NEXT_CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

enum Outbound {
    Text(String),
    Close,
}

/// Completion callbacks waiting for an `ack` frame.
#[derive(Default)]
struct PendingAcks {
    callbacks: Mutex<HashMap<u64, AckCallback>>,
    next_id: AtomicU64,
}

impl PendingAcks {
    fn register(&self, callback: AckCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);
        id
    }

    /// Register `callback` if the connection is still open.
    ///
    /// The state is checked after inserting: the reader marks the
    /// connection closed before it clears the table, so a callback is either
    /// refused here or dropped by that clear.
    fn register_while_open(&self, callback: AckCallback, ready_state: &AtomicU32) -> Option<u64> {
        let id = self.register(callback);
        if ready_state.load(Ordering::SeqCst) != WS_OPEN {
            self.take(id);
            return None;
        }
        Some(id)
    }

    fn take(&self, id: u64) -> Option<AckCallback> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    fn clear(&self) -> usize {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = callbacks.len();
        callbacks.clear();
        dropped
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A single WebSocket connection.
pub struct WebSocketTransport {
    id: u32,
    sender: mpsc::UnboundedSender<Outbound>,
    ready_state: Arc<AtomicU32>,
    acks: Arc<PendingAcks>,
}

impl WebSocketTransport {
    /// Start connecting and return immediately.
    ///
    /// The outcome is reported to `sink`: `Connect` once the handshake
    /// succeeds, or `Disconnect` if it fails.
    pub fn connect(config: SocketConfig, sink: Arc<dyn EventSink>) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
        let ready_state = Arc::new(AtomicU32::new(WS_CONNECTING));
        let acks = Arc::new(PendingAcks::default());

        let connection = Connection {
            id,
            config,
            sink: sink.clone(),
            ready_state: ready_state.clone(),
            acks: acks.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("socket-service-{}", id))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .worker_threads(2)
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        connection.fail(format!("failed to create runtime: {}", e));
                        return;
                    }
                };

                let fallback = connection.clone();
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    rt.block_on(connection.run(rx));
                }));

                if let Err(e) = result {
                    let message = e
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| e.downcast_ref::<String>().cloned())
                        .unwrap_or_default();
                    fallback.fail(format!("connection thread panicked: {}", message));
                }
            });

        if let Err(e) = spawned {
            log::error!("[WebSocket {}] Failed to spawn connection thread: {}", id, e);
            ready_state.store(WS_CLOSED, Ordering::SeqCst);
            sink.on_event(TransportEvent::Disconnect {
                reason: format!("failed to spawn connection thread: {}", e),
            });
        }

        Self {
            id,
            sender: tx,
            ready_state,
            acks,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn ready_state(&self) -> u32 {
        self.ready_state.load(Ordering::SeqCst)
    }
}

impl Transport for WebSocketTransport {
    fn emit(&self, event: &str, payload: Option<Value>, ack: Option<AckCallback>) -> Result<()> {
        if self.ready_state() != WS_OPEN {
            return Err(SocketError::NotConnected);
        }

        let ack_id = match ack {
            Some(callback) => Some(
                self.acks
                    .register_while_open(callback, &self.ready_state)
                    .ok_or(SocketError::NotConnected)?,
            ),
            None => None,
        };
        let frame = Frame::Event {
            event: event.to_string(),
            data: payload,
            id: ack_id,
        };

        let sent = frame.encode().and_then(|text| {
            self.sender
                .send(Outbound::Text(text))
                .map_err(|_| SocketError::Closed)
        });

        if sent.is_err() {
            if let Some(ack_id) = ack_id {
                self.acks.take(ack_id);
            }
        }
        sent
    }

    fn close(&self) {
        let state = self.ready_state();
        if state == WS_CLOSING || state == WS_CLOSED {
            return;
        }
        self.ready_state.store(WS_CLOSING, Ordering::SeqCst);
        log::info!("[WebSocket {}] Closing", self.id);
        let _ = self.sender.send(Outbound::Close);
    }
}

/// State owned by the connection thread.
#[derive(Clone)]
struct Connection {
    id: u32,
    config: SocketConfig,
    sink: Arc<dyn EventSink>,
    ready_state: Arc<AtomicU32>,
    acks: Arc<PendingAcks>,
}

impl Connection {
    fn fail(&self, reason: String) {
        log::error!("[WebSocket {}] {}", self.id, reason);
        self.ready_state.store(WS_CLOSED, Ordering::SeqCst);
        let dropped = self.acks.clear();
        if dropped > 0 {
            log::debug!("[WebSocket {}] Dropped {} pending acks", self.id, dropped);
        }
        self.sink.on_event(TransportEvent::Disconnect { reason });
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        log::info!("[WebSocket {}] Connecting to {}", self.id, self.config.url);

        let stream = match self.open().await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        // close() may have been called while the handshake was in flight
        let opened = self
            .ready_state
            .compare_exchange(WS_CONNECTING, WS_OPEN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if opened {
            self.sink.on_event(TransportEvent::Connect);
        } else {
            log::info!("[WebSocket {}] Closed during handshake", self.id);
        }

        let (mut write, mut read) = stream.split();

        let id = self.id;
        let send_task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            log::error!("[WebSocket {}] Send error: {}", id, e);
                            break;
                        }
                    }
                    // None: the transport was dropped
                    Some(Outbound::Close) | None => {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            log::debug!("[WebSocket {}] Close error: {}", id, e);
                        }
                        break;
                    }
                }
            }
        });

        let reason = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    log::debug!("[WebSocket {}] Ignoring binary ({} bytes)", self.id, data.len());
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Handled by tungstenite
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1000, String::new()));
                    log::info!("[WebSocket {}] Received close: {} {}", self.id, code, reason);
                    break format!("closed ({}) {}", code, reason).trim_end().to_string();
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    log::error!("[WebSocket {}] Read error: {}", self.id, e);
                    break format!("connection error: {}", e);
                }
                None => break "connection ended".to_string(),
            }
        };

        send_task.abort();
        self.ready_state.store(WS_CLOSED, Ordering::SeqCst);
        let dropped = self.acks.clear();
        if dropped > 0 {
            log::debug!("[WebSocket {}] Dropped {} pending acks", self.id, dropped);
        }
        log::info!("[WebSocket {}] Connection ended", self.id);
        self.sink.on_event(TransportEvent::Disconnect { reason });
    }

    async fn open(&self) -> Result<WsStream> {
        let endpoint = self.config.endpoint()?;

        if endpoint.secure && !cfg!(feature = "tls") {
            return Err(SocketError::UnsupportedScheme(
                "wss (built without the tls feature)".to_string(),
            ));
        }

        // rustls needs a process-wide provider; a second install just fails
        #[cfg(feature = "tls")]
        let _ = rustls::crypto::ring::default_provider().install_default();

        log::info!("[WebSocket {}] Connecting TCP to {}", self.id, endpoint.addr);
        let tcp_stream = TcpStream::connect(&endpoint.addr).await?;
        log::info!("[WebSocket {}] TCP connected", self.id);

        let mut request = endpoint.url.as_str().into_client_request()?;
        if let Some(origin) = &self.config.origin {
            request
                .headers_mut()
                .insert("Origin", HeaderValue::from_str(origin)?);
        }
        if let Some(protocol) = &self.config.protocol {
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_str(protocol)?);
        }

        log::info!("[WebSocket {}] Performing WebSocket handshake", self.id);

        #[cfg(feature = "tls")]
        let (stream, response) = tokio_tungstenite::client_async_tls(request, tcp_stream).await?;
        #[cfg(not(feature = "tls"))]
        let (stream, response) =
            tokio_tungstenite::client_async(request, MaybeTlsStream::Plain(tcp_stream)).await?;

        log::info!(
            "[WebSocket {}] Connected successfully (status: {})",
            self.id,
            response.status()
        );
        Ok(stream)
    }

    fn handle_text(&self, text: &str) {
        log::debug!(
            "[WebSocket {}] Received: {}",
            self.id,
            text.chars().take(100).collect::<String>()
        );

        match Frame::decode(text) {
            Ok(Frame::Event { event, data, id }) => {
                if id.is_some() {
                    log::debug!("[WebSocket {}] {} asked for an ack; not supported", self.id, event);
                }
                self.sink.on_event(TransportEvent::Message {
                    event,
                    payload: data.unwrap_or(Value::Null),
                });
            }
            Ok(Frame::Ack { id }) => match self.acks.take(id) {
                Some(callback) => callback(),
                None => log::warn!("[WebSocket {}] Ack for unknown id {}", self.id, id),
            },
            Err(e) => log::warn!("[WebSocket {}] {}", self.id, e),
        }
    }
}
