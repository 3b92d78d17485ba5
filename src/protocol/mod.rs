//! Agent protocol message types.
//!
//! This module defines the message format exchanged between the client and
//! the sandbox agent.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`OutboundRequest`] | Client → Agent | Method call with `id` |
//! | [`Envelope::Success`] | Agent → Client | Result for `id` |
//! | [`Envelope::Error`] | Agent → Client | Error for `id` |
//! | [`Envelope::Notification`] | Agent → Client | Push update, no `id` |
//!
//! # Method Naming
//!
//! Methods follow `domain/action` format:
//!
//! - `client/join`
//! - `fs/readFile`
//! - `shell/out`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Frame encode/decode boundary |
//! | `join` | Join handshake types and reserved methods |
//! | `message` | Request and envelope types |

// ============================================================================
// Submodules
// ============================================================================

/// Frame encode/decode boundary.
pub mod codec;

/// Join handshake types.
pub mod join;

/// Request and envelope message types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, JsonCodec};
pub use join::{
    ClientInfo, DEFAULT_APP_ID, HIBERNATE_METHOD, JOIN_METHOD, JoinParams, JoinResult,
    PROTOCOL_VERSION,
};
pub use message::{Envelope, ErrorBody, OutboundRequest};
