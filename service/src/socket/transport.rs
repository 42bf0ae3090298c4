//! Transport Interface
//!
//! The seam between [`SocketService`](crate::SocketService) and the client
//! that actually talks to the server. The facade only ever sends through
//! [`Transport::emit`]; everything the transport observes comes back as a
//! [`TransportEvent`] pushed into an [`EventSink`].

use serde_json::Value;

use crate::socket::Result;

/// Completion callback for an emitted event, run once the peer acknowledges it.
pub type AckCallback = Box<dyn FnOnce() + Send + 'static>;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is open and can send.
    Connect,
    /// The connection ended, for any reason.
    Disconnect { reason: String },
    /// An inbound event. `payload` is `Null` when the frame had none.
    Message { event: String, payload: Value },
}

/// Receiver of transport events.
///
/// Called from the transport's own thread.
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: TransportEvent);
}

/// A duplex messaging client.
pub trait Transport: Send + Sync + 'static {
    /// Send one event. Fails with `NotConnected` unless the connection is open.
    fn emit(&self, event: &str, payload: Option<Value>, ack: Option<AckCallback>) -> Result<()>;

    /// Ask the connection to close. A `Disconnect` follows once it has.
    fn close(&self);
}
