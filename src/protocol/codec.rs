//! Frame codec boundary.
//!
//! The connection only needs `encode(request) -> bytes` and
//! `decode(bytes) -> envelope`; everything about the byte layout lives
//! behind [`Codec`].

use serde_json::{from_slice, to_vec};

use crate::error::{Error, Result};

use super::{Envelope, OutboundRequest};

// ============================================================================
// Codec
// ============================================================================

/// Converts between typed messages and binary frame payloads.
pub trait Codec: Send + Sync + 'static {
    /// Encodes an outbound request into frame bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    fn encode(&self, request: &OutboundRequest) -> Result<Vec<u8>>;

    /// Decodes frame bytes into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for malformed or unrecognized frames.
    fn decode(&self, bytes: &[u8]) -> Result<Envelope>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// JSON payloads carried in binary frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, request: &OutboundRequest) -> Result<Vec<u8>> {
        Ok(to_vec(request)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope> {
        from_slice(bytes).map_err(|e| Error::decode(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
