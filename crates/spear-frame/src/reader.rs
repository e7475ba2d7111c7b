use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{check_payload_len, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Reads exactly the 8-byte header, then exactly the payload it announces, so
/// nothing beyond the current frame is ever consumed from the stream. Partial
/// reads are handled internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached, whether
    /// on a frame boundary or mid-frame.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; HEADER_SIZE];
        self.fill(&mut header)?;

        let len = check_payload_len(u64::from_le_bytes(header), self.config.max_payload_size)?;

        let mut payload = BytesMut::zeroed(len);
        self.fill(&mut payload)?;
        trace!(len, "read frame");

        Ok(Frame {
            payload: payload.freeze(),
        })
    }

    /// Read until `buf` is full. Interrupted and would-block reads are retried.
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::yield_now();
                    continue;
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
