use std::fmt;
use std::io;

use spear_agent::AgentError;
use spear_frame::FrameError;
use spear_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { addr, source } => CliError::new(
            TRANSPORT_ERROR,
            format!("{context}: failed to connect to {addr}: {source}"),
        ),
        TransportError::InvalidAddress { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Shutdown => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn agent_error(context: &str, err: AgentError) -> CliError {
    match err {
        AgentError::Transport(err) => transport_error(context, err),
        AgentError::Frame(err) => frame_error(context, err),
        AgentError::Io(err) => io_error(context, err),
        AgentError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        AgentError::Codec(_) | AgentError::Protocol(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        AgentError::HandshakeFailed(_) | AgentError::Disconnected(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        AgentError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        AgentError::Remote(_) | AgentError::Stopped => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        AgentError::AlreadyRunning => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
