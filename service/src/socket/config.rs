//! Connection settings, read from the environment once at construction.

use url::Url;

use crate::socket::{Result, SocketError};

/// Server address, e.g. `ws://localhost:3000`.
pub const URL_ENV: &str = "SOCKET_SERVICE_URL";
/// Optional `Origin` header sent with the handshake.
pub const ORIGIN_ENV: &str = "SOCKET_SERVICE_ORIGIN";
/// Optional `Sec-WebSocket-Protocol` header sent with the handshake.
pub const PROTOCOL_ENV: &str = "SOCKET_SERVICE_PROTOCOL";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketConfig {
    pub url: String,
    pub origin: Option<String>,
    pub protocol: Option<String>,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// A missing address is left empty; connecting to it fails on the
    /// transport thread like any other bad address.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            url: non_empty(URL_ENV).unwrap_or_default(),
            origin: non_empty(ORIGIN_ENV),
            protocol: non_empty(PROTOCOL_ENV),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Parse and validate the server address.
    pub fn endpoint(&self) -> Result<Endpoint> {
        let url = Url::parse(&self.url).map_err(|source| SocketError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;

        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(SocketError::UnsupportedScheme(other.to_string())),
        };

        let host = url.host_str().unwrap_or("localhost");
        let port = url.port().unwrap_or(if secure { 443 } else { 80 });
        let addr = format!("{}:{}", host, port);

        Ok(Endpoint { url, addr, secure })
    }
}

/// A validated server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    /// `host:port` for the TCP connection.
    pub addr: String,
    pub secure: bool,
}
