use std::time::Duration;

use crate::codec::CodecError;
use crate::envelope::RpcError;

/// Errors that can occur in agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] spear_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] spear_frame::FrameError),

    /// Envelope or tool message could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The host answered with a non-zero response code.
    #[error("remote error: {0}")]
    Remote(#[from] RpcError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The host sent something the agent did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Host disconnected.
    #[error("host disconnected: {0}")]
    Disconnected(String),

    /// `run` was called on an agent that is already running.
    #[error("agent is already running")]
    AlreadyRunning,

    /// The agent has been stopped.
    #[error("agent is stopped")]
    Stopped,

    /// OS-level error outside the transport (e.g. spawning threads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
