use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised between the facade and its transport.
///
/// None of these reach callers of `emit`, `listen` or the accessor; they are
/// logged and turned into a disconnect at most.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] tungstenite::http::header::InvalidHeaderValue),

    #[error("TCP connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("socket is not open")]
    NotConnected,

    #[error("socket is closed")]
    Closed,
}

pub type Result<T, E = SocketError> = std::result::Result<T, E>;
