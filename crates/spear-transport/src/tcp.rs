use std::net::{TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::HostStream;

/// Connect to the host at `addr` (`host:port`, blocking).
///
/// Every resolved address is tried in turn; the error of the last attempt is
/// reported if none accepts. The returned stream has `TCP_NODELAY` set.
pub fn connect(addr: &str) -> Result<HostStream> {
    let candidates: Vec<_> = addr
        .to_socket_addrs()
        .map_err(|err| TransportError::InvalidAddress {
            addr: addr.to_string(),
            reason: err.to_string(),
        })?
        .collect();

    if candidates.is_empty() {
        return Err(TransportError::InvalidAddress {
            addr: addr.to_string(),
            reason: "address resolved to nothing".to_string(),
        });
    }

    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect(candidate) {
            Ok(stream) => {
                debug!(addr, resolved = %candidate, "connected to host");
                let stream = HostStream::from_tcp(stream);
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => {
                debug!(addr, resolved = %candidate, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: last_err
            .unwrap_or_else(|| std::io::Error::other("no address accepted the connection")),
    })
}
