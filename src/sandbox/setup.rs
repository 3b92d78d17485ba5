//! Setup progress façade.

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::Result;
use crate::event::Subscription;

use super::subscribe_typed;

const GET: &str = "setup/get";
const PROGRESS: &str = "setup/progress";

/// State of the sandbox setup or one of its steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupState {
    /// Not started.
    #[default]
    Pending,
    /// In progress.
    Running,
    /// Done.
    Complete,
    /// Failed.
    Failed,
    /// Anything else.
    #[serde(other)]
    Other,
}

/// One setup step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupStep {
    /// Step name.
    pub name: String,
    /// Step state.
    pub state: SetupState,
    /// Detail, typically set on failure.
    #[serde(default)]
    pub message: Option<String>,
}

/// Overall setup status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupStatus {
    /// Overall state.
    pub state: SetupState,
    /// Steps in execution order.
    pub steps: Vec<SetupStep>,
}

impl SetupStatus {
    /// Returns `true` once setup completed.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == SetupState::Complete
    }
}

/// Payload of `setup/progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupProgress {
    /// Step that progressed.
    pub step: String,
    /// Its new state.
    pub state: SetupState,
    /// Detail line.
    #[serde(default)]
    pub message: Option<String>,
}

/// Sandbox setup status.
#[derive(Debug, Clone)]
pub struct Setup {
    connection: Connection,
}

impl Setup {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Returns the current setup status.
    pub async fn get(&self) -> Result<SetupStatus> {
        self.connection.request_typed(GET, &serde_json::Map::new()).await
    }

    /// Subscribes to setup progress.
    pub fn on_progress<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SetupProgress) + Send + Sync + 'static,
    {
        subscribe_typed(&self.connection, PROGRESS, handler)
    }
}
