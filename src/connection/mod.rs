//! Connection state machine, request correlation, and notification routing.
//!
//! # Architecture
//!
//! ```text
//! request() ──► PendingRequests.register ──► TransportSocket.send
//!                      ▲
//! TransportSocket ──► decode ──┬─► Success / Error ──► PendingRequests.resolve
//!                              └─► Notification ────► NotificationDispatcher
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Connection and per-request options |
//! | `core` | [`Connection`] |
//! | `notifications` | Method-keyed notification routing |
//! | `pending` | In-flight request table |
//! | `state` | Lifecycle state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Connection configuration.
pub mod config;

/// The connection itself.
pub mod core;

/// Notification routing.
pub mod notifications;

/// In-flight request table.
pub mod pending;

/// Lifecycle state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::config::{ConnectionConfig, DEFAULT_HEARTBEAT_GRACE, DEFAULT_REQUEST_TIMEOUT, RequestOptions};
pub use self::core::{Connection, ReconnectOutcome, RequestFailure};
pub use self::notifications::NotificationDispatcher;
pub use self::pending::{MAX_PENDING_REQUESTS, PendingHandle, PendingRequests};
pub use self::state::{ConnectionEvent, ConnectionState, Effect, Transition, transition};
