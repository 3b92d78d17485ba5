//! Sandbox Agent Client - reconnectable RPC client for remote sandboxes.
//!
//! This library maintains a persistent, multiplexed request/response and
//! notification connection to the agent process running inside a remote
//! sandbox, and exposes typed façades for its filesystem, shells, ports,
//! tasks, setup, and system metrics.
//!
//! # Architecture
//!
//! The client layers five pieces:
//!
//! - **Transport Socket**: one WebSocket, binary frames, heartbeat pings
//! - **Ordered Delivery Queue**: inbound frames reach subscribers in arrival order
//! - **Pending Request Table**: id-correlated futures with timeouts
//! - **Notification Dispatcher**: method-keyed fan-out of server pushes
//! - **Connection**: composes the above with a CONNECTED / CONNECTING /
//!   DISCONNECTED / HIBERNATED state machine and the join handshake
//!
//! Key design principles:
//!
//! - Request ids are never reused across transports, so stale responses are dropped
//! - Disconnect and hibernation are states, recovered with `reconnect()`
//! - Only disposal is terminal
//!
//! # Quick Start
//!
//! ```no_run
//! use sandbox_agent_client::{Result, SandboxClient, TransportCredentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = SandboxClient::builder()
//!         .sandbox_id("sb-123")
//!         .credentials(TransportCredentials::new("wss://agent.example.com/ws", "token"))
//!         .connect()
//!         .await?;
//!
//!     client.fs().write_file("/tmp/hello.txt", b"hello").await?;
//!     let text = client.fs().read_to_string("/tmp/hello.txt").await?;
//!     println!("{text}");
//!
//!     let _state = client.on_state_change(|state| println!("connection {state}"));
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`SandboxClient`] and its builder |
//! | [`connection`] | [`Connection`], state machine, pending table, dispatcher |
//! | [`dispose`] | Ordered cleanup registry |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`event`] | Observer primitive and [`Subscription`] handles |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelopes, codec, join handshake |
//! | [`sandbox`] | Domain façades |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Sandbox client entry point.
///
/// Use [`SandboxClient::builder()`] to create a connected client.
pub mod client;

/// Connection state machine and request correlation.
pub mod connection;

/// Ordered, run-once cleanup registry.
pub mod dispose;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Observer primitive used for every event stream.
pub mod event;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire protocol types.
///
/// Envelopes, the [`Codec`] seam, and the join handshake.
pub mod protocol;

/// Typed domain façades.
pub mod sandbox;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ClientBuilder, FnRefresher, SandboxClient, SessionRefresher, StaticRefresher};

// Connection types
pub use connection::{
    Connection, ConnectionConfig, ConnectionState, PendingHandle, ReconnectOutcome, RequestFailure,
    RequestOptions,
};

// Error types
pub use error::{Error, Result};

// Event types
pub use event::{Emitter, Subscription};

// Identifier types
pub use identifiers::{RequestId, SandboxId, ShellId, SubscriptionId, TaskId, TransportId};

// Protocol types
pub use protocol::{ClientInfo, Codec, Envelope, ErrorBody, JoinResult, JsonCodec, OutboundRequest};

// Sandbox façades
pub use sandbox::{Fs, Ports, Setup, Shell, System, Tasks};

// Transport types
pub use transport::{
    Connector, DisconnectReason, ReadyState, TransportCredentials, TransportOptions, TransportSocket,
    WebSocketConnector,
};
