//! WebSocket transport layer.
//!
//! This module owns the physical connection to the sandbox agent.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌─────────────────┐
//! │  Connection          │                          │  Sandbox Agent  │
//! │                      │        WebSocket         │                 │
//! │  TransportSocket ────┼─────────────────────────►│                 │
//! │   ├ reader ─► OrderedQueue ─► on_message        │                 │
//! │   ├ writer            │   binary frames         │                 │
//! │   └ heartbeat         │                         │                 │
//! └──────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Transport Lifecycle
//!
//! 1. [`Connector::connect`] - Open the WebSocket (fails on any pre-open error)
//! 2. [`TransportSocket`] - Send frames, receive frames, watch heartbeats
//! 3. `on_disconnected` - Fires exactly once
//! 4. [`TransportSocket::dispose`] - Idempotent teardown
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connector` | Transport establishment and credentials |
//! | `options` | Timing configuration |
//! | `queue` | Ordered delivery queue |
//! | `socket` | One physical connection |

// ============================================================================
// Submodules
// ============================================================================

/// Transport establishment.
pub mod connector;

/// Transport timing options.
pub mod options;

/// Ordered delivery queue.
pub mod queue;

/// One physical WebSocket connection.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{Connector, TransportCredentials, WebSocketConnector};
pub use options::TransportOptions;
pub use queue::OrderedQueue;
pub use socket::{DisconnectReason, ReadyState, TransportSocket};
