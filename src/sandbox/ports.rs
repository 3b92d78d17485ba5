//! Port façade.

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::Result;
use crate::event::Subscription;

use super::subscribe_typed;

const LIST: &str = "port/list";
const CHANGED: &str = "port/changed";

/// A listening port inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    /// Port number.
    pub port: u16,
    /// Bound address.
    #[serde(default)]
    pub address: Option<String>,
    /// Owning process name.
    #[serde(default)]
    pub process: Option<String>,
}

/// Payload of `port/changed`: the full current port list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortsChanged {
    /// Ports listening now.
    #[serde(default)]
    pub ports: Vec<PortInfo>,
}

/// Listening ports inside the sandbox.
#[derive(Debug, Clone)]
pub struct Ports {
    connection: Connection,
}

impl Ports {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Lists listening ports.
    pub async fn list(&self) -> Result<Vec<PortInfo>> {
        let result: PortsChanged = self.connection.request_typed(LIST, &serde_json::Map::new()).await?;
        Ok(result.ports)
    }

    /// Subscribes to port list changes.
    pub fn on_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PortsChanged) + Send + Sync + 'static,
    {
        subscribe_typed(&self.connection, CHANGED, handler)
    }
}
