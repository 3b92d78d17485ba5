//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sandbox_agent_client::ConnectionConfig;
//!
//! let config = ConnectionConfig::new()
//!     .with_request_timeout(Duration::from_secs(30))
//!     .with_subscription("shell/out")
//!     .with_reject_pending_on_disconnect(true);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::ClientInfo;
use crate::transport::TransportOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Grace window between a missing heartbeat and the disconnect decision.
pub const DEFAULT_HEARTBEAT_GRACE: Duration = Duration::from_millis(1000);

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Behavior of a [`Connection`](super::Connection).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Timeout applied to requests without an override.
    pub request_timeout: Duration,

    /// Wait after a missing heartbeat before deciding to disconnect.
    pub heartbeat_grace: Duration,

    /// Client identification sent during join.
    pub client_info: ClientInfo,

    /// Request asynchronous progress notifications during join.
    pub async_progress: bool,

    /// Notification methods declared during join, in addition to the ones
    /// with active subscribers.
    pub subscriptions: Vec<String>,

    /// Reject in-flight requests with [`Error::ConnectionClosed`] when the
    /// connection leaves CONNECTED, instead of letting them time out.
    pub reject_pending_on_disconnect: bool,

    /// Options for every transport this connection builds.
    pub transport: TransportOptions,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            heartbeat_grace: DEFAULT_HEARTBEAT_GRACE,
            client_info: ClientInfo::default(),
            async_progress: true,
            subscriptions: Vec::new(),
            reject_pending_on_disconnect: false,
            transport: TransportOptions::new(),
        }
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the heartbeat grace window.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_grace(mut self, grace: Duration) -> Self {
        self.heartbeat_grace = grace;
        self
    }

    /// Sets the client identification.
    #[inline]
    #[must_use]
    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }

    /// Enables or disables async progress.
    #[inline]
    #[must_use]
    pub fn with_async_progress(mut self, enabled: bool) -> Self {
        self.async_progress = enabled;
        self
    }

    /// Declares one notification method during join.
    #[inline]
    #[must_use]
    pub fn with_subscription(mut self, method: impl Into<String>) -> Self {
        self.subscriptions.push(method.into());
        self
    }

    /// Declares several notification methods during join.
    #[inline]
    #[must_use]
    pub fn with_subscriptions(mut self, methods: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subscriptions.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Chooses whether stranded requests are rejected on disconnect.
    #[inline]
    #[must_use]
    pub fn with_reject_pending_on_disconnect(mut self, reject: bool) -> Self {
        self.reject_pending_on_disconnect = reject;
        self
    }

    /// Sets the transport options.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero timeouts or invalid transport
    /// options.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be greater than zero"));
        }
        if self.client_info.app_id.is_empty() {
            return Err(Error::config("client_info.app_id must not be empty"));
        }
        self.transport.validate().map_err(Error::config)
    }
}

// ============================================================================
// RequestOptions
// ============================================================================

/// Per-request overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Timeout for this request; the connection default when `None`.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Creates options with no overrides.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Sets the timeout for this request.
    #[inline]
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
