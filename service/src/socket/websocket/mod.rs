//! WebSocket Transport
//!
//! The [`Transport`](crate::Transport) implementation backed by
//! tokio-tungstenite.

mod manager;

pub use manager::{WS_CLOSED, WS_CLOSING, WS_CONNECTING, WS_OPEN, WebSocketTransport};
