//! Socket Module
//!
//! One shared real-time connection: [`SocketService`] tracks whether it is
//! connected and passes `emit`/`listen` through to a [`Transport`].

mod config;
mod error;
mod events;
mod protocol;
mod service;
mod transport;
mod websocket;

#[cfg(test)]
mod testing;

pub use config::{Endpoint, ORIGIN_ENV, PROTOCOL_ENV, SocketConfig, URL_ENV};
pub use error::{Result, SocketError};
pub use events::{CONNECT_EVENT, DISCONNECT_EVENT, Event, Listener, ListenerRegistry, Subscription};
pub use protocol::Frame;
pub use service::SocketService;
pub use transport::{AckCallback, EventSink, Transport, TransportEvent};
pub use websocket::*;
