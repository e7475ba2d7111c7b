use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::str::FromStr;

use crate::error::{AgentError, Result};

/// Size of the raw secret written before any framed traffic.
pub const SECRET_SIZE: usize = 8;

/// Shared secret presented to the host right after connecting.
///
/// Treated as credential material: `Debug` output is redacted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HostSecret(u64);

impl HostSecret {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Wire form: 8 bytes, little-endian.
    pub fn to_bytes(self) -> [u8; SECRET_SIZE] {
        self.0.to_le_bytes()
    }
}

impl From<u64> for HostSecret {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for HostSecret {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|err| AgentError::Config(format!("invalid secret: {err}")))
    }
}

impl fmt::Debug for HostSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostSecret(<redacted>)")
    }
}

/// Write the handshake: the raw secret, unframed. No acknowledgment is read.
pub fn send_secret<W: Write>(stream: &mut W, secret: HostSecret) -> Result<()> {
    stream
        .write_all(&secret.to_bytes())
        .and_then(|()| stream.flush())
        .map_err(|err| AgentError::HandshakeFailed(format!("failed to send secret: {err}")))
}

/// Read a handshake secret (host side of the exchange; used by test hosts).
pub fn read_secret<R: Read>(stream: &mut R) -> Result<HostSecret> {
    let mut buf = [0u8; SECRET_SIZE];
    stream.read_exact(&mut buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            AgentError::Disconnected("connection closed during handshake".to_string())
        } else {
            AgentError::HandshakeFailed(format!("failed to read secret: {err}"))
        }
    })?;
    Ok(HostSecret(u64::from_le_bytes(buf)))
}
