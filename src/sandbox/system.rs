//! System façade.

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::Result;
use crate::event::Subscription;
use crate::protocol::HIBERNATE_METHOD;

use super::subscribe_typed;

const METRICS: &str = "system/metrics";

/// Resource usage snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemMetrics {
    /// CPU usage, 0-100 per core summed.
    pub cpu_percent: f64,
    /// Memory in use, bytes.
    pub memory_used: u64,
    /// Memory available to the sandbox, bytes.
    pub memory_total: u64,
    /// Disk in use, bytes.
    pub disk_used: u64,
    /// Disk available to the sandbox, bytes.
    pub disk_total: u64,
}

/// Payload of `system/hibernate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HibernateNotice {
    /// Why the sandbox is hibernating.
    pub reason: Option<String>,
}

/// System metrics and lifecycle notices.
#[derive(Debug, Clone)]
pub struct System {
    connection: Connection,
}

impl System {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Returns current resource usage.
    pub async fn metrics(&self) -> Result<SystemMetrics> {
        self.connection.request_typed(METRICS, &serde_json::Map::new()).await
    }

    /// Subscribes to hibernation notices.
    ///
    /// The connection has already moved to HIBERNATED when the handler runs.
    pub fn on_hibernate<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&HibernateNotice) + Send + Sync + 'static,
    {
        subscribe_typed(&self.connection, HIBERNATE_METHOD, handler)
    }
}
