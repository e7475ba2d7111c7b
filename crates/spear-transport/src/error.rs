/// Errors that can occur in host transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host address could not be parsed or resolved.
    #[error("invalid host address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Failed to connect to the host.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
