use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
#[cfg(test)]
use std::time::Duration;

use crate::error::{Result, TransportError};
#[cfg(test)]
use crate::poll::wait_readable;

/// Cross-thread wakeup channel usable in the same readiness wait as a socket.
///
/// `notify` writes one byte to an internal socket pair; the receiving end
/// (exposed through [`AsRawFd`]) then polls readable until [`Notifier::drain`]
/// empties it. A notifier that is never drained stays readable, which makes it
/// usable as a latched shutdown flag observed by several threads.
#[derive(Debug)]
pub struct Notifier {
    tx: UnixStream,
    rx: UnixStream,
}

impl Notifier {
    /// Create a new, unsignalled notifier.
    pub fn new() -> Result<Self> {
        let (tx, rx) = UnixStream::pair()?;
        tx.set_nonblocking(true)?;
        rx.set_nonblocking(true)?;
        Ok(Self { tx, rx })
    }

    /// Signal the notifier.
    ///
    /// A full socket buffer means a wakeup is already pending and is not an error.
    pub fn notify(&self) -> Result<()> {
        loop {
            match (&self.tx).write(&[1]) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Consume all pending wakeups. Returns the number of signals drained.
    pub fn drain(&self) -> Result<usize> {
        let mut drained = 0usize;
        let mut buf = [0u8; 64];
        loop {
            match (&self.rx).read(&mut buf) {
                Ok(0) => return Ok(drained),
                Ok(n) => drained += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(drained),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Whether a wakeup is pending, without consuming it.
    #[cfg(test)]
    fn is_signalled(&self) -> Result<bool> {
        let readiness = wait_readable(&[self.rx.as_raw_fd()], Some(Duration::ZERO))?;
        Ok(readiness.is_ready(0))
    }
}

impl AsRawFd for Notifier {
    fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}
