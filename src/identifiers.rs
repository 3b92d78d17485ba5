//! Type-safe identifiers for connection and sandbox entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Wraps | Issued by |
//! |------|-------|-----------|
//! | [`RequestId`] | `u64` | Connection counter, strictly increasing |
//! | [`SubscriptionId`] | `u64` | Process-wide counter |
//! | [`TransportId`] | `u64` | Process-wide counter |
//! | [`SandboxId`] | `String` | Control plane |
//! | [`ShellId`] | `String` | Agent |
//! | [`TaskId`] | `String` | Agent |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Counters
// ============================================================================

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// RequestId
// ============================================================================

/// Identifier correlating a request with its response.
///
/// Allocated by the owning connection; never reused for the lifetime of that
/// connection, across any number of transport swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw request id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Opaque token identifying one subscriber.
///
/// Removal is by token rather than by callback, so the same callback may be
/// subscribed twice and removed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates a fresh, process-unique subscription id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// TransportId
// ============================================================================

/// Identifies one physical transport instance.
///
/// Used to make listeners attached to a replaced transport inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(u64);

impl TransportId {
    /// Allocates a fresh, process-unique transport id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

// ============================================================================
// String Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id! {
    /// Identifies a sandbox (the remote execution environment).
    SandboxId
}

string_id! {
    /// Identifies a shell process inside the sandbox.
    ShellId
}

string_id! {
    /// Identifies a configured task inside the sandbox.
    TaskId
}

// ============================================================================
// Tests
// ============================================================================
