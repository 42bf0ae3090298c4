//! In-process transport for tests.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::socket::transport::{AckCallback, EventSink, Transport, TransportEvent};
use crate::socket::{Result, SocketError, SocketService};

/// Records every send and lets tests play the server's side.
pub(crate) struct MockTransport {
    sink: Arc<dyn EventSink>,
    open: AtomicBool,
    sent: Mutex<Vec<(String, Option<Value>)>>,
    acks: Mutex<Vec<AckCallback>>,
    closes: AtomicUsize,
    ignore_close: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new(sink: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            open: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            ignore_close: AtomicBool::new(false),
        })
    }

    pub(crate) fn connect(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.sink.on_event(TransportEvent::Connect);
    }

    pub(crate) fn disconnect(&self, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        self.sink.on_event(TransportEvent::Disconnect {
            reason: reason.to_string(),
        });
    }

    pub(crate) fn receive(&self, event: &str, payload: Value) {
        self.sink.on_event(TransportEvent::Message {
            event: event.to_string(),
            payload,
        });
    }

    /// Every `emit` call so far, including those made while closed.
    pub(crate) fn sent(&self) -> Vec<(String, Option<Value>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Run all pending ack callbacks and return how many ran.
    pub(crate) fn acknowledge_all(&self) -> usize {
        let acks: Vec<AckCallback> = self.acks.lock().unwrap().drain(..).collect();
        let count = acks.len();
        for ack in acks {
            ack();
        }
        count
    }

    /// Count `close` calls without ever disconnecting, like an unresponsive server.
    pub(crate) fn ignore_close(&self) {
        self.ignore_close.store(true, Ordering::SeqCst);
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn emit(&self, event: &str, payload: Option<Value>, ack: Option<AckCallback>) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((event.to_string(), payload));

        if !self.open.load(Ordering::SeqCst) {
            return Err(SocketError::NotConnected);
        }
        if let Some(ack) = ack {
            self.acks.lock().unwrap().push(ack);
        }
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.open.load(Ordering::SeqCst) && !self.ignore_close.load(Ordering::SeqCst) {
            self.disconnect("closed by client");
        }
    }
}

/// A service wired to a fresh [`MockTransport`].
pub(crate) fn mock_service() -> (SocketService, Arc<MockTransport>) {
    let mut mock = None;
    let service = SocketService::with_transport(|sink| {
        let transport = MockTransport::new(sink);
        mock = Some(transport.clone());
        transport
    });
    let mock = mock.expect("with_transport calls its constructor");
    (service, mock)
}
