//! Sandbox client entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SandboxClient`] | Connection, reconnect token, and façades for one sandbox |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`SessionRefresher`] | Source of fresh transport credentials |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Session refresh seam.
pub mod refresh;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::builder::ClientBuilder;
pub use self::core::SandboxClient;
pub use self::refresh::{FnRefresher, SessionRefresher, StaticRefresher};
