//! Sandbox client: one connection to one sandbox agent.
//!
//! # Example
//!
//! ```no_run
//! use sandbox_agent_client::{SandboxClient, TransportCredentials};
//!
//! # async fn example() -> sandbox_agent_client::Result<()> {
//! let client = SandboxClient::builder()
//!     .sandbox_id("sb-123")
//!     .credentials(TransportCredentials::new("wss://agent.example.com/ws", "token"))
//!     .connect()
//!     .await?;
//!
//! let entries = client.fs().read_dir("/project").await?;
//! println!("{} entries", entries.len());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::connection::{Connection, ConnectionState, ReconnectOutcome};
use crate::error::Result;
use crate::event::Subscription;
use crate::identifiers::SandboxId;
use crate::sandbox::{Fs, Ports, Setup, Shell, System, Tasks};

use super::builder::ClientBuilder;
use super::refresh::SessionRefresher;

// ============================================================================
// Types
// ============================================================================

/// Shared client state.
pub(crate) struct ClientInner {
    /// Sandbox this client talks to.
    pub sandbox_id: SandboxId,

    /// Underlying connection.
    pub connection: Connection,

    /// Credential source for reconnects.
    pub refresher: Arc<dyn SessionRefresher>,

    /// Latest reconnect token issued by a join.
    pub reconnect_token: Mutex<Option<String>>,
}

// ============================================================================
// SandboxClient
// ============================================================================

/// Client for one sandbox agent.
///
/// Cheap to clone. Owns the [`Connection`], remembers the latest reconnect
/// token, and hands out the domain façades.
#[derive(Clone)]
pub struct SandboxClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for SandboxClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxClient")
            .field("sandbox_id", &self.inner.sandbox_id)
            .field("state", &self.state())
            .field("has_reconnect_token", &self.inner.reconnect_token.lock().is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SandboxClient - Construction
// ============================================================================

impl SandboxClient {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        sandbox_id: SandboxId,
        connection: Connection,
        refresher: Arc<dyn SessionRefresher>,
        reconnect_token: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                sandbox_id,
                connection,
                refresher,
                reconnect_token: Mutex::new(reconnect_token),
            }),
        }
    }
}

// ============================================================================
// SandboxClient - Accessors
// ============================================================================

impl SandboxClient {
    /// Returns the sandbox id.
    #[inline]
    #[must_use]
    pub fn sandbox_id(&self) -> &SandboxId {
        &self.inner.sandbox_id
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Returns the reconnect token that the next reconnect will present.
    #[must_use]
    pub fn reconnect_token(&self) -> Option<String> {
        self.inner.reconnect_token.lock().clone()
    }

    /// Subscribes to connection state transitions.
    pub fn on_state_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.connection.on_state_change(listener)
    }
}

// ============================================================================
// SandboxClient - Façades
// ============================================================================

impl SandboxClient {
    /// Filesystem operations.
    #[inline]
    #[must_use]
    pub fn fs(&self) -> Fs {
        Fs::new(self.inner.connection.clone())
    }

    /// Interactive shells.
    #[inline]
    #[must_use]
    pub fn shell(&self) -> Shell {
        Shell::new(self.inner.connection.clone())
    }

    /// Open ports.
    #[inline]
    #[must_use]
    pub fn ports(&self) -> Ports {
        Ports::new(self.inner.connection.clone())
    }

    /// Configured tasks.
    #[inline]
    #[must_use]
    pub fn tasks(&self) -> Tasks {
        Tasks::new(self.inner.connection.clone())
    }

    /// Sandbox setup progress.
    #[inline]
    #[must_use]
    pub fn setup(&self) -> Setup {
        Setup::new(self.inner.connection.clone())
    }

    /// System metrics and lifecycle.
    #[inline]
    #[must_use]
    pub fn system(&self) -> System {
        System::new(self.inner.connection.clone())
    }
}

// ============================================================================
// SandboxClient - Lifecycle
// ============================================================================

impl SandboxClient {
    /// Reconnects with fresh credentials from the session refresher,
    /// presenting the stored reconnect token.
    ///
    /// A newer reconnect token returned by the join replaces the stored one.
    /// Skipped unless the connection is DISCONNECTED or HIBERNATED.
    ///
    /// # Errors
    ///
    /// Refresher, transport, or join failure. The connection is left
    /// DISCONNECTED so the call can be retried.
    pub async fn reconnect(&self) -> Result<ReconnectOutcome> {
        let token = self.reconnect_token();
        let refresher = Arc::clone(&self.inner.refresher);
        let sandbox_id = self.inner.sandbox_id.clone();

        debug!(sandbox_id = %sandbox_id, resuming = token.is_some(), "Client reconnect requested");

        let outcome = self
            .inner
            .connection
            .reconnect(token, move || async move { refresher.refresh(&sandbox_id).await })
            .await?;

        if let Some(token) = outcome.reconnect_token() {
            *self.inner.reconnect_token.lock() = Some(token.to_string());
            info!(sandbox_id = %self.inner.sandbox_id, "Reconnect token rotated");
        }

        Ok(outcome)
    }

    /// Waits for in-flight requests, then disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`](crate::Error::Disposed) after disposal.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.connection.disconnect().await
    }

    /// Disposes the connection. Idempotent.
    pub fn dispose(&self) {
        self.inner.connection.dispose();
    }
}
