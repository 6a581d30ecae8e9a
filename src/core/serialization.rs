//! # Bounded Binary Serialization
//!
//! Envelope bytes are produced and parsed with bincode configured for a hard
//! size limit, fixed-width integers and no trailing bytes. The limit is the
//! connection's maximum message size, so a hostile length field inside a
//! frame can never make the decoder allocate more than one frame's worth.
//!
//! ## Usage
//! ```ignore
//! use kad_protocol::core::serialization::WireFormat;
//!
//! let bytes = message.to_wire(max_message_size)?;
//! let back = Message::from_wire(&bytes, max_message_size)?;
//! ```

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ProtocolError, Result};

/// Bincode options shared by both directions of the wire.
fn bincode_options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(limit as u64)
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Types that travel inside a frame
pub trait WireFormat: Serialize + DeserializeOwned + Sized {
    /// Serialize, failing when the result would exceed `limit` bytes
    fn to_wire(&self, limit: usize) -> Result<Vec<u8>> {
        bincode_options(limit)
            .serialize(self)
            .map_err(|e| ProtocolError::EncodeError(e.to_string()))
    }

    /// Deserialize, failing on malformed, oversized or trailing input
    fn from_wire(data: &[u8], limit: usize) -> Result<Self> {
        bincode_options(limit)
            .deserialize(data)
            .map_err(|e| ProtocolError::DecodeError(e.to_string()))
    }

    /// Size of the serialized form
    fn wire_size(&self) -> Result<u64> {
        bincode_options(usize::MAX)
            .serialized_size(self)
            .map_err(|e| ProtocolError::EncodeError(e.to_string()))
    }
}
