//! # Error Types
//!
//! Error handling for the DHT wire-protocol core.
//!
//! Every failure the connection pipeline can observe is a variant of
//! [`ProtocolError`]. Most of them are scoped to a single inbound message: the
//! pipeline logs them, drops that message (or its response) and keeps reading.
//! Only stream-level failures end a connection, see
//! [`ProtocolError::is_connection_fatal`].
//!
//! ## Error Categories
//! - **Framing**: oversized frames, corrupt length prefixes
//! - **Envelope**: decode and encode failures of the message envelope
//! - **Dispatch**: unknown message kinds, handler failures
//! - **Routing**: peer table rejections
//! - **Stream**: I/O failures and closed connections
//!
//! ## Example Usage
//! ```rust
//! use kad_protocol::error::{ProtocolError, Result};
//!
//! fn check_len(len: usize, max: usize) -> Result<()> {
//!     if len > max {
//!         return Err(ProtocolError::FrameTooLarge(len, max));
//!     }
//!     Ok(())
//! }
//!
//! let err = check_len(10, 4).unwrap_err();
//! assert!(!err.is_connection_fatal());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Registry-related error messages
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on handler registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on handler registry";

    /// Framing errors
    pub const ERR_VARINT_OVERFLOW: &str = "Length prefix exceeds 10 bytes";
    pub const ERR_TRUNCATED_FRAME: &str = "Stream ended inside a frame";

    /// Envelope errors
    pub const ERR_UNKNOWN_KIND_ENCODE: &str = "Cannot encode a message of unknown kind";
    pub const ERR_PUT_VALUE_MISSING_KEY: &str = "PUT_VALUE requires a key";
    pub const ERR_PUT_VALUE_MISSING_VALUE: &str = "PUT_VALUE requires a value";
    pub const ERR_EMPTY_PEER_ID: &str = "Peer descriptor has an empty id";

    /// Routing errors
    pub const ERR_ADDRESS_BOOK_FULL: &str = "Address book full";
    pub const ERR_EMPTY_PEER: &str = "Refusing to record a peer with an empty id";
}

/// Primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("No handler for message kind {0}")]
    UnknownKind(i32),

    #[error("Peer table update failed: {0}")]
    PeerUpdate(String),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Synchronization primitive poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// True when the error ends the connection it happened on.
    ///
    /// Everything else is contained to the message that caused it.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_) | ProtocolError::InvalidFrame(_) | ProtocolError::ConnectionClosed
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stream_errors_are_fatal() {
        assert!(ProtocolError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_connection_fatal());
        assert!(ProtocolError::InvalidFrame("x".into()).is_connection_fatal());
        assert!(ProtocolError::ConnectionClosed.is_connection_fatal());

        assert!(!ProtocolError::FrameTooLarge(10, 5).is_connection_fatal());
        assert!(!ProtocolError::DecodeError("bad".into()).is_connection_fatal());
        assert!(!ProtocolError::EncodeError("bad".into()).is_connection_fatal());
        assert!(!ProtocolError::UnknownKind(42).is_connection_fatal());
        assert!(!ProtocolError::PeerUpdate("full".into()).is_connection_fatal());
        assert!(!ProtocolError::Handler("boom".into()).is_connection_fatal());
    }

    #[test]
    fn display_includes_details() {
        let err = ProtocolError::FrameTooLarge(2049, 2048);
        assert_eq!(err.to_string(), "Frame too large: 2049 bytes (max 2048)");
        assert_eq!(
            ProtocolError::UnknownKind(9).to_string(),
            "No handler for message kind 9"
        );
    }
}
