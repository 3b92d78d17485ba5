//! Session refresh seam.
//!
//! Reconnecting needs fresh transport credentials because the previous token
//! may have expired. A [`SessionRefresher`] fetches them from whatever issues
//! sandbox sessions.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::SandboxId;
use crate::transport::TransportCredentials;

// ============================================================================
// SessionRefresher
// ============================================================================

/// Issues fresh transport credentials for a sandbox.
#[async_trait]
pub trait SessionRefresher: Send + Sync + 'static {
    /// Returns credentials for a new transport to `sandbox_id`.
    ///
    /// # Errors
    ///
    /// Any error aborts the reconnect attempt that asked for credentials.
    async fn refresh(&self, sandbox_id: &SandboxId) -> Result<TransportCredentials>;
}

// ============================================================================
// StaticRefresher
// ============================================================================

/// Hands out the same credentials every time.
#[derive(Clone)]
pub struct StaticRefresher {
    credentials: TransportCredentials,
}

impl fmt::Debug for StaticRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticRefresher")
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl StaticRefresher {
    /// Creates a refresher returning `credentials`.
    #[inline]
    #[must_use]
    pub fn new(credentials: TransportCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl SessionRefresher for StaticRefresher {
    async fn refresh(&self, _sandbox_id: &SandboxId) -> Result<TransportCredentials> {
        Ok(self.credentials.clone())
    }
}

// ============================================================================
// FnRefresher
// ============================================================================

/// Adapts an async closure into a [`SessionRefresher`].
pub struct FnRefresher<F> {
    refresh: F,
}

impl<F> fmt::Debug for FnRefresher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRefresher").finish_non_exhaustive()
    }
}

impl<F, Fut> FnRefresher<F>
where
    F: Fn(SandboxId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TransportCredentials>> + Send + 'static,
{
    /// Wraps `refresh`.
    #[inline]
    #[must_use]
    pub fn new(refresh: F) -> Self {
        Self { refresh }
    }
}

#[async_trait]
impl<F, Fut> SessionRefresher for FnRefresher<F>
where
    F: Fn(SandboxId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TransportCredentials>> + Send + 'static,
{
    async fn refresh(&self, sandbox_id: &SandboxId) -> Result<TransportCredentials> {
        (self.refresh)(sandbox_id.clone()).await
    }
}

// ============================================================================
// Tests
// ============================================================================
