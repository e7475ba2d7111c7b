use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: payload length as u64 little-endian = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬─────────────────┐
/// │ Length (8B LE u64) │ Payload         │
/// │                    │ (Length bytes)  │
/// └────────────────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u64_le(payload.len() as u64);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = check_payload_len(u64::from_le_bytes(header), max_payload)?;

    if src.len() - HEADER_SIZE < payload_len {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { payload }))
}

/// Validate a length prefix against the configured maximum.
pub(crate) fn check_payload_len(len: u64, max_payload: usize) -> Result<usize> {
    match usize::try_from(len) {
        Ok(len) if len <= max_payload => Ok(len),
        _ => Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_payload,
        }),
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
