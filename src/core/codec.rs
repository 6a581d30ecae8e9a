//! # Frame Codec
//!
//! Tokio codec splitting a byte stream into length-prefixed frames.
//!
//! ## Wire Format
//! ```text
//! [Length (unsigned LEB128 varint, 1-10 bytes)] [Payload (Length bytes)]
//! ```
//!
//! Frames whose declared length exceeds the configured maximum are skipped
//! as their bytes arrive. They are never buffered and never surface as an
//! error, so a single hostile frame cannot stall or kill the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::Metrics;

/// Longest valid varint encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` as an unsigned LEB128 varint.
pub fn encode_varint(mut value: u64, dst: &mut BytesMut) {
    while value >= 0x80 {
        dst.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Parse an unsigned LEB128 varint from the front of `src`.
///
/// Returns the value and the number of bytes it occupied, or `None` when
/// more input is needed.
pub fn decode_varint(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (i, &byte) in src.iter().enumerate().take(MAX_VARINT_LEN) {
        // the tenth byte only has room for the top bit of a u64
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(ProtocolError::InvalidFrame(
                constants::ERR_VARINT_OVERFLOW.to_string(),
            ));
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for a length prefix
    Head,
    /// Length known, waiting for the payload
    Data(usize),
    /// Skipping the remaining bytes of an oversized frame
    Discard(usize),
}

/// Length-delimited frame codec with a hard frame size bound
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_len: usize,
    state: DecodeState,
    oversized: u64,
    metrics: Option<Arc<Metrics>>,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            state: DecodeState::Head,
            oversized: 0,
            metrics: None,
        }
    }

    /// Report dropped frames into a shared metrics collector as well
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Number of frames dropped for exceeding the size bound
    pub fn oversized_frames(&self) -> u64 {
        self.oversized
    }

    fn start_discard(&mut self, len: usize) {
        self.oversized += 1;
        if let Some(metrics) = &self.metrics {
            metrics.frame_oversized();
        }
        warn!(
            component = "codec",
            bytes = len,
            max = self.max_frame_len,
            "Dropping oversized frame"
        );
        self.state = DecodeState::Discard(len);
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.state {
                DecodeState::Head => {
                    let Some((len, consumed)) = decode_varint(src)? else {
                        return Ok(None);
                    };
                    src.advance(consumed);

                    let len = usize::try_from(len).unwrap_or(usize::MAX);
                    if len > self.max_frame_len {
                        self.start_discard(len);
                    } else {
                        self.state = DecodeState::Data(len);
                    }
                }
                DecodeState::Data(len) => {
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    self.state = DecodeState::Head;
                    trace!(component = "codec", bytes = len, "Frame decoded");
                    return Ok(Some(src.split_to(len).freeze()));
                }
                DecodeState::Discard(remaining) => {
                    let skip = remaining.min(src.len());
                    src.advance(skip);
                    if remaining > skip {
                        self.state = DecodeState::Discard(remaining - skip);
                        return Ok(None);
                    }
                    self.state = DecodeState::Head;
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() && self.state == DecodeState::Head {
            Ok(None)
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                constants::ERR_TRUNCATED_FRAME,
            )
            .into())
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge(frame.len(), self.max_frame_len));
        }
        dst.reserve(MAX_VARINT_LEN + frame.len());
        encode_varint(frame.len() as u64, dst);
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
