//! Transport timing configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sandbox_agent_client::transport::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_ping_interval(Duration::from_secs(5))
//!     .with_pong_detection_timeout(Duration::from_secs(15));
//! ```

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between keepalive pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Default silence after which a heartbeat is considered missing.
pub const DEFAULT_PONG_DETECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for activity after an explicit [`ping`](super::TransportSocket::ping).
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// TransportOptions
// ============================================================================

/// Timing options for one transport socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Maximum time to establish the connection.
    pub connect_timeout: Duration,

    /// Interval between keepalive pings and heartbeat checks.
    pub ping_interval: Duration,

    /// Silence window before a missing heartbeat is reported.
    pub pong_detection_timeout: Duration,

    /// Default timeout used by explicit pings.
    pub ping_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOptions {
    /// Creates options with default timings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_detection_timeout: DEFAULT_PONG_DETECTION_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the keepalive ping interval.
    #[inline]
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the heartbeat silence window.
    #[inline]
    #[must_use]
    pub const fn with_pong_detection_timeout(mut self, timeout: Duration) -> Self {
        self.pong_detection_timeout = timeout;
        self
    }

    /// Sets the explicit ping timeout.
    #[inline]
    #[must_use]
    pub const fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if any duration is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than zero".to_string());
        }
        if self.ping_interval.is_zero() {
            return Err("ping_interval must be greater than zero".to_string());
        }
        if self.pong_detection_timeout.is_zero() {
            return Err("pong_detection_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
