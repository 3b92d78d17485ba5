//! Connection lifecycle state machine.
//!
//! [`transition`] is pure: given the current state and an event it returns
//! the next state plus the side effects the caller must run, or `None` when
//! the event does not apply in that state.
//!
//! ```text
//! CONNECTED    --TransportLost-->      DISCONNECTED
//! CONNECTED    --HibernateReceived-->  HIBERNATED
//! CONNECTED    --Disconnect-->         DISCONNECTED
//! HIBERNATED   --Disconnect-->         DISCONNECTED
//! DISCONNECTED --ReconnectStarted-->   CONNECTING
//! HIBERNATED   --ReconnectStarted-->   CONNECTING
//! CONNECTING   --JoinSucceeded-->      CONNECTED
//! CONNECTING   --JoinFailed-->         DISCONNECTED
//! ```

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Joined and usable.
    Connected,
    /// Reconnect in progress.
    Connecting,
    /// Transport lost or closed.
    Disconnected,
    /// Agent suspended the sandbox.
    Hibernated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "CONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Disconnected => "DISCONNECTED",
            Self::Hibernated => "HIBERNATED",
        })
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The current transport disconnected or its heartbeat was lost.
    TransportLost,
    /// `system/hibernate` arrived.
    HibernateReceived,
    /// Graceful disconnect requested.
    Disconnect,
    /// `reconnect()` was called.
    ReconnectStarted,
    /// The join handshake completed.
    JoinSucceeded,
    /// The join handshake or transport setup failed.
    JoinFailed,
}

// ============================================================================
// Effect
// ============================================================================

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Detach and dispose the current transport.
    DisposeTransport,
    /// In-flight requests lost their transport.
    PendingStranded,
    /// Publish the new state to subscribers.
    NotifyState(ConnectionState),
}

// ============================================================================
// Transition
// ============================================================================

/// Result of applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the event.
    pub state: ConnectionState,
    /// Effects to run, in order.
    pub effects: Vec<Effect>,
}

/// Computes the transition for `event` in state `current`.
#[must_use]
pub fn transition(current: ConnectionState, event: ConnectionEvent) -> Option<Transition> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    let leave_connected = |state| Transition {
        state,
        effects: vec![
            Effect::DisposeTransport,
            Effect::PendingStranded,
            Effect::NotifyState(state),
        ],
    };

    match (current, event) {
        (S::Connected, E::TransportLost | E::Disconnect) => Some(leave_connected(S::Disconnected)),
        (S::Connected, E::HibernateReceived) => Some(leave_connected(S::Hibernated)),

        (S::Hibernated, E::Disconnect) => Some(Transition {
            state: S::Disconnected,
            effects: vec![Effect::DisposeTransport, Effect::NotifyState(S::Disconnected)],
        }),

        (S::Disconnected | S::Hibernated, E::ReconnectStarted) => Some(Transition {
            state: S::Connecting,
            effects: vec![Effect::DisposeTransport, Effect::NotifyState(S::Connecting)],
        }),

        (S::Connecting, E::JoinSucceeded) => Some(Transition {
            state: S::Connected,
            effects: vec![Effect::NotifyState(S::Connected)],
        }),

        (S::Connecting, E::JoinFailed) => Some(Transition {
            state: S::Disconnected,
            effects: vec![Effect::DisposeTransport, Effect::NotifyState(S::Disconnected)],
        }),

        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
