//! Transport establishment.
//!
//! [`Connector`] is the seam through which the connection builds every new
//! transport, initial or after a reconnect. [`WebSocketConnector`] is the
//! production implementation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

use super::options::TransportOptions;
use super::socket::TransportSocket;

// ============================================================================
// TransportCredentials
// ============================================================================

/// Connection details issued by the session service.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportCredentials {
    /// Agent WebSocket URL.
    pub url: String,
    /// Access token for this transport.
    pub token: String,
}

impl fmt::Debug for TransportCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCredentials")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TransportCredentials {
    /// Creates credentials.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    /// Builds the transport URL carrying the token and, when resuming, the
    /// reconnect token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the base URL is invalid, or
    /// [`Error::Config`] if its scheme is not `ws` or `wss`.
    pub fn transport_url(&self, reconnect_token: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "transport URL must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", &self.token);
            if let Some(reconnect_token) = reconnect_token {
                query.append_pair("reconnectToken", reconnect_token);
            }
        }
        Ok(url)
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Establishes open transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects to `url`, resolving only once the socket is open.
    ///
    /// # Errors
    ///
    /// Any error or close before open is returned as an error.
    async fn connect(&self, url: &Url, options: &TransportOptions) -> Result<TransportSocket>;
}

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Connects over the network with `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url, options: &TransportOptions) -> Result<TransportSocket> {
        debug!(host = url.host_str().unwrap_or_default(), "Opening transport");

        let (ws_stream, _response) = timeout(options.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(options.connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        // Log without the query string: it carries tokens.
        let display_url = format!(
            "{}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.path()
        );
        info!(url = %display_url, "WebSocket connection established");

        Ok(TransportSocket::from_stream(ws_stream, display_url, options))
    }
}

// ============================================================================
// Tests
// ============================================================================
