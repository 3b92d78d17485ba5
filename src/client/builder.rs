//! Builder for [`SandboxClient`].
//!
//! # Example
//!
//! ```no_run
//! use sandbox_agent_client::{ConnectionConfig, SandboxClient, TransportCredentials};
//!
//! # async fn example() -> sandbox_agent_client::Result<()> {
//! let client = SandboxClient::builder()
//!     .sandbox_id("sb-123")
//!     .refresh_fn(|sandbox_id| async move {
//!         Ok(TransportCredentials::new(format!("wss://{sandbox_id}.agent.example.com"), "fresh"))
//!     })
//!     .config(ConnectionConfig::new().with_subscription("shell/out"))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::{Error, Result};
use crate::identifiers::SandboxId;
use crate::transport::{Connector, TransportCredentials, WebSocketConnector};

use super::core::SandboxClient;
use super::refresh::{FnRefresher, SessionRefresher, StaticRefresher};

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`SandboxClient`].
///
/// Use [`SandboxClient::builder()`] to create one.
#[derive(Default)]
pub struct ClientBuilder {
    /// Target sandbox.
    sandbox_id: Option<SandboxId>,
    /// Credentials for the first transport.
    credentials: Option<TransportCredentials>,
    /// Credential source for reconnects.
    refresher: Option<Arc<dyn SessionRefresher>>,
    /// Transport factory.
    connector: Option<Arc<dyn Connector>>,
    /// Connection behavior.
    config: ConnectionConfig,
    /// Token resuming an earlier session.
    reconnect_token: Option<String>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("sandbox_id", &self.sandbox_id)
            .field("credentials", &self.credentials)
            .field("has_refresher", &self.refresher.is_some())
            .field("has_connector", &self.connector.is_some())
            .field("config", &self.config)
            .field("has_reconnect_token", &self.reconnect_token.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sandbox id.
    #[inline]
    #[must_use]
    pub fn sandbox_id(mut self, sandbox_id: impl Into<SandboxId>) -> Self {
        self.sandbox_id = Some(sandbox_id.into());
        self
    }

    /// Sets the credentials for the first transport.
    ///
    /// Without them the refresher is asked before connecting.
    #[inline]
    #[must_use]
    pub fn credentials(mut self, credentials: TransportCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the session refresher used by reconnects.
    #[inline]
    #[must_use]
    pub fn refresher(mut self, refresher: impl SessionRefresher) -> Self {
        self.refresher = Some(Arc::new(refresher));
        self
    }

    /// Sets an async closure as the session refresher.
    #[inline]
    #[must_use]
    pub fn refresh_fn<F, Fut>(self, refresh: F) -> Self
    where
        F: Fn(SandboxId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TransportCredentials>> + Send + 'static,
    {
        self.refresher(FnRefresher::new(refresh))
    }

    /// Replaces the default WebSocket connector.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Sets the connection configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Resumes an earlier session with `token`.
    #[inline]
    #[must_use]
    pub fn reconnect_token(mut self, token: impl Into<String>) -> Self {
        self.reconnect_token = Some(token.into());
        self
    }

    /// Validates the configuration, opens the transport, joins, and returns
    /// the connected client.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the sandbox id is missing or empty, if neither
    ///   credentials nor a refresher is set, or if the connection config is
    ///   invalid
    /// - any refresher, transport, or join error
    pub async fn connect(self) -> Result<SandboxClient> {
        let sandbox_id = self.validate_sandbox_id()?;
        self.config.validate()?;

        let refresher: Arc<dyn SessionRefresher> = match (&self.refresher, &self.credentials) {
            (Some(refresher), _) => Arc::clone(refresher),
            (None, Some(credentials)) => Arc::new(StaticRefresher::new(credentials.clone())),
            (None, None) => {
                return Err(Error::config(
                    "Credentials or a session refresher are required. \
                     Use .credentials() or .refresher() to set one.",
                ));
            }
        };

        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => refresher.refresh(&sandbox_id).await?,
        };

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector),
        };

        let (connection, joined) = Connection::connect(
            connector,
            &credentials,
            self.reconnect_token.as_deref(),
            self.config,
        )
        .await?;

        info!(sandbox_id = %sandbox_id, "Sandbox client connected");

        let reconnect_token = joined.reconnect_token.or(self.reconnect_token);
        Ok(SandboxClient::from_parts(sandbox_id, connection, refresher, reconnect_token))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    fn validate_sandbox_id(&self) -> Result<SandboxId> {
        let sandbox_id = self.sandbox_id.clone().ok_or_else(|| {
            Error::config(
                "Sandbox id is required. Use .sandbox_id() to set it.\n\
                 Example: SandboxClient::builder().sandbox_id(\"sb-123\")",
            )
        })?;

        if sandbox_id.as_str().trim().is_empty() {
            return Err(Error::config("Sandbox id must not be empty"));
        }

        Ok(sandbox_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
