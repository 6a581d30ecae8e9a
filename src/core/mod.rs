//! # Core Protocol Components
//!
//! Low-level framing and binary serialization.
//!
//! ## Components
//! - **Codec**: Tokio codec for varint length-prefixed frames
//! - **Serialization**: size-bounded bincode for message envelopes
//!
//! ## Wire Format
//! ```text
//! [Length (varint)] [Envelope (Length bytes, bincode)]
//! ```
//!
//! ## Security
//! - Maximum frame size: 2 MiB by default (prevents memory exhaustion)
//! - Oversized frames are skipped without being buffered
//! - Envelope decoding is bounded by the same limit

pub mod codec;
pub mod serialization;
