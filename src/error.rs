//! Error types for the sandbox agent client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use sandbox_agent_client::{Error, Result};
//!
//! async fn example(client: &SandboxClient) -> Result<()> {
//!     match client.fs().read_file("/project/README.md").await {
//!         Ok(bytes) => println!("{} bytes", bytes.len()),
//!         Err(e) if e.is_timeout() => println!("agent is slow"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotOpen`] |
//! | Protocol | [`Error::Protocol`], [`Error::Decode`], [`Error::UnexpectedResponse`] |
//! | Request lifecycle | [`Error::RequestTimeout`], [`Error::Disposed`] |
//! | State | [`Error::InvalidState`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::connection::ConnectionState;
use crate::identifiers::RequestId;
use crate::transport::ReadyState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client or connection configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to a façade call.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when a transport cannot be established, including any
    /// error or close event observed before the socket opened.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport did not open within the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// No live transport, or the transport went away underneath a request.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Send attempted on a socket that is closing or closed.
    #[error("Transport is not open (state: {state})")]
    NotOpen {
        /// Socket state at the time of the send.
        state: ReadyState,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Error envelope returned by the agent for one request.
    #[error("Protocol error {code}: {message}")]
    Protocol {
        /// Numeric error code from the agent.
        code: i64,
        /// Error message from the agent.
        message: String,
        /// Optional structured error payload.
        data: Option<Value>,
    },

    /// Inbound frame could not be decoded into an envelope.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// Result payload did not have the expected shape.
    #[error("Unexpected response to {method}: {message}")]
    UnexpectedResponse {
        /// Method whose result was malformed.
        method: String,
        /// Description of the mismatch.
        message: String,
    },

    // ========================================================================
    // Request Lifecycle Errors
    // ========================================================================
    /// No response arrived before the request deadline.
    #[error("Request {request_id} ({method}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Method of the request.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Request abandoned because the connection or table was disposed.
    #[error("Connection disposed")]
    Disposed,

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Operation not valid in the current connection state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: String,
        /// Connection state at the time.
        state: ConnectionState,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not-open error.
    #[inline]
    pub fn not_open(state: ReadyState) -> Self {
        Self::NotOpen { state }
    }

    /// Creates a protocol error from an agent error envelope.
    #[inline]
    pub fn protocol(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an unexpected response error.
    #[inline]
    pub fn unexpected_response(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(operation: impl Into<String>, state: ConnectionState) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if the request was abandoned by disposal.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Returns `true` if the agent answered with an error envelope.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotOpen { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry, possibly after a reconnect.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotOpen { .. }
                | Self::RequestTimeout { .. }
        )
    }

    /// Returns the agent error code for protocol errors.
    #[inline]
    #[must_use]
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
