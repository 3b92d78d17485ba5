//! Task façade.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;
use crate::event::Subscription;
use crate::identifiers::TaskId;

use super::subscribe_typed;

// ============================================================================
// Constants
// ============================================================================

const LIST: &str = "task/list";
const RUN: &str = "task/run";
const STOP: &str = "task/stop";
const UPDATE: &str = "task/update";

// ============================================================================
// Types
// ============================================================================

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Not started.
    Idle,
    /// Running.
    Running,
    /// Stopped on request.
    Stopped,
    /// Exited successfully.
    Completed,
    /// Exited with an error.
    Failed,
    /// Anything else.
    #[serde(other)]
    Other,
}

impl TaskState {
    /// Returns `true` once the task is no longer running.
    #[inline]
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }
}

/// A configured task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Task id.
    pub id: TaskId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Command line.
    #[serde(default)]
    pub command: String,
    /// Current state.
    pub state: TaskState,
}

/// Payload of `task/update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    /// Updated task.
    pub task_id: TaskId,
    /// New state.
    pub state: TaskState,
    /// Exit code once finished.
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskParams<'a> {
    task_id: &'a TaskId,
}

#[derive(Deserialize)]
struct TasksResult {
    tasks: Vec<TaskInfo>,
}

// ============================================================================
// Tasks
// ============================================================================

/// Configured tasks inside the sandbox.
#[derive(Debug, Clone)]
pub struct Tasks {
    connection: Connection,
}

impl Tasks {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Lists tasks.
    pub async fn list(&self) -> Result<Vec<TaskInfo>> {
        let result: TasksResult = self.connection.request_typed(LIST, &serde_json::Map::new()).await?;
        debug!(count = result.tasks.len(), "Listed tasks");
        Ok(result.tasks)
    }

    /// Starts a task.
    pub async fn run(&self, task_id: &TaskId) -> Result<()> {
        debug!(task_id = %task_id, "Running task");
        self.connection
            .request(RUN, serde_json::to_value(TaskParams { task_id })?)
            .await?;
        Ok(())
    }

    /// Stops a task.
    pub async fn stop(&self, task_id: &TaskId) -> Result<()> {
        debug!(task_id = %task_id, "Stopping task");
        self.connection
            .request(STOP, serde_json::to_value(TaskParams { task_id })?)
            .await?;
        Ok(())
    }

    /// Subscribes to task state updates.
    pub fn on_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TaskUpdate) + Send + Sync + 'static,
    {
        subscribe_typed(&self.connection, UPDATE, handler)
    }
}

// ============================================================================
// Tests
// ============================================================================
