//! Request and envelope message types.
//!
//! Defines the frame shapes exchanged with the agent.
//!
//! # Format
//!
//! Outbound request:
//! ```json
//! { "id": 3, "method": "fs/readFile", "params": { "path": "/a" } }
//! ```
//!
//! Inbound success / error / notification:
//! ```json
//! { "id": 3, "method": "fs/readFile", "result": { ... } }
//! { "id": 3, "method": "fs/readFile", "error": { "code": 404, "message": "..." } }
//! { "method": "shell/out", "params": { ... } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// OutboundRequest
// ============================================================================

/// A request frame from client to agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Correlation id, unique within one connection.
    pub id: RequestId,

    /// Method in `domain/action` format.
    pub method: String,

    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl OutboundRequest {
    /// Creates a new request frame.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// ErrorBody
// ============================================================================

/// Error payload of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: i64,

    /// Human readable message.
    pub message: String,

    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<ErrorBody> for Error {
    fn from(body: ErrorBody) -> Self {
        Error::protocol(body.code, body.message, body.data)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope", into = "RawEnvelope")]
pub enum Envelope {
    /// Server-initiated message, not correlated to a request.
    Notification {
        /// Notification method.
        method: String,
        /// Notification payload.
        params: Value,
    },

    /// Successful result for request `id`.
    Success {
        /// Id of the request being answered.
        id: RequestId,
        /// Method of the request being answered.
        method: String,
        /// Result payload.
        result: Value,
    },

    /// Failed result for request `id`.
    Error {
        /// Id of the request being answered.
        id: RequestId,
        /// Method of the request being answered.
        method: String,
        /// Error payload.
        error: ErrorBody,
    },
}

impl Envelope {
    /// Returns `true` for notification envelopes.
    #[inline]
    #[must_use]
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification { .. })
    }

    /// Returns `true` for success results.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns `true` for error results.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns the method name carried by the envelope.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Notification { method, .. }
            | Self::Success { method, .. }
            | Self::Error { method, .. } => method,
        }
    }

    /// Returns the correlated request id, if any.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Notification { .. } => None,
            Self::Success { id, .. } | Self::Error { id, .. } => Some(*id),
        }
    }
}

// ============================================================================
// RawEnvelope
// ============================================================================

/// Wire shape shared by all envelope kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,

    #[serde(default)]
    method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = Error;

    fn try_from(raw: RawEnvelope) -> Result<Self> {
        match (raw.id, raw.error) {
            (None, _) if raw.method.is_empty() => {
                Err(Error::decode("envelope has neither id nor method"))
            }
            (None, _) => Ok(Self::Notification {
                method: raw.method,
                params: raw.params.unwrap_or(Value::Null),
            }),
            (Some(id), Some(error)) => Ok(Self::Error {
                id,
                method: raw.method,
                error,
            }),
            // `"result": null` deserializes to `None`
            (Some(id), None) => Ok(Self::Success {
                id,
                method: raw.method,
                result: raw.result.unwrap_or(Value::Null),
            }),
        }
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope::Notification { method, params } => Self {
                id: None,
                method,
                params: Some(params),
                result: None,
                error: None,
            },
            Envelope::Success { id, method, result } => Self {
                id: Some(id),
                method,
                params: None,
                result: Some(result),
                error: None,
            },
            Envelope::Error { id, method, error } => Self {
                id: Some(id),
                method,
                params: None,
                result: None,
                error: Some(error),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = OutboundRequest::new(RequestId::new(3), "fs/readFile", json!({"path": "/a"}));
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value, json!({"id": 3, "method": "fs/readFile", "params": {"path": "/a"}}));
    }

    #[test]
    fn test_notification_envelope() {
        let envelope: Envelope =
            serde_json::from_value(json!({"method": "shell/out", "params": {"shellId": "a"}}))
                .expect("parse");
        assert!(envelope.is_notification());
        assert_eq!(envelope.method(), "shell/out");
        assert_eq!(envelope.id(), None);
    }

    #[test]
    fn test_success_envelope_with_null_result() {
        let envelope: Envelope =
            serde_json::from_value(json!({"id": 9, "method": "task/run", "result": null}))
                .expect("parse");
        assert_eq!(
            envelope,
            Envelope::Success {
                id: RequestId::new(9),
                method: "task/run".into(),
                result: Value::Null,
            }
        );
    }

    #[test]
    fn test_error_envelope() {
        let envelope: Envelope = serde_json::from_value(json!({
            "id": 4,
            "method": "fs/stat",
            "error": {"code": 404, "message": "no such file", "data": {"path": "/x"}}
        }))
        .expect("parse");
        assert!(envelope.is_error());

        let Envelope::Error { error, .. } = envelope else {
            panic!("expected error envelope");
        };
        let err: Error = error.into();
        assert_eq!(err.protocol_code(), Some(404));
    }

    #[test]
    fn test_envelope_without_id_or_method_is_rejected() {
        let result = serde_json::from_value::<Envelope>(json!({"params": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_serializes_to_wire_shape() {
        let envelope = Envelope::Notification {
            method: "system/hibernate".into(),
            params: Value::Null,
        };
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value, json!({"method": "system/hibernate", "params": null}));
    }
}
