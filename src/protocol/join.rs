//! Join handshake and reserved method names.
//!
//! `client/join` is the mandatory first request on every transport. It
//! identifies the client, declares the notifications it wants pushed, and
//! returns a reconnect token for the next transport.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Join handshake method.
pub const JOIN_METHOD: &str = "client/join";

/// Server-pushed hibernation notice.
pub const HIBERNATE_METHOD: &str = "system/hibernate";

/// Protocol version announced during join.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default application identifier announced during join.
pub const DEFAULT_APP_ID: &str = "sandbox-agent-client";

// ============================================================================
// ClientInfo
// ============================================================================

/// Client identification sent in the join handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Protocol version spoken by this client.
    pub protocol_version: String,

    /// Application identifier.
    pub app_id: String,

    /// Per-process instance id, stable across reconnects.
    pub instance_id: Uuid,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            instance_id: Uuid::new_v4(),
        }
    }
}

impl ClientInfo {
    /// Creates client info with a custom application id.
    #[must_use]
    pub fn with_app_id(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// JoinParams
// ============================================================================

/// Parameters of `client/join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    /// Client identification.
    pub client_info: ClientInfo,

    /// Ask the agent to stream progress for long-running requests.
    pub async_progress: bool,

    /// Notification methods the client wants pushed.
    pub subscriptions: Vec<String>,
}

// ============================================================================
// JoinResult
// ============================================================================

/// Result of `client/join`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResult {
    /// Token resuming this session on the next transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_token: Option<String>,

    /// Remaining join payload (agent and sandbox details).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Tests
// ============================================================================
