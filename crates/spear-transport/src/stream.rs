use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected host stream implementing Read + Write.
///
/// Wraps the TCP connection to the host. Clones made with
/// [`HostStream::try_clone`] share the same socket, so one clone can be handed
/// to a writer thread and another to a reader thread.
pub struct HostStream {
    inner: TcpStream,
}

impl Read for HostStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for HostStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl HostStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Disable Nagle's algorithm so small frames leave immediately.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor for the same socket).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_tcp(cloned))
    }

    /// Shut down one or both halves of the connection.
    ///
    /// Affects every clone of the stream. A reader blocked in `read` wakes up
    /// with end-of-stream.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        match self.inner.shutdown(how) {
            Ok(()) => Ok(()),
            // Already disconnected by the peer.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Address of the host end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Address of the local end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for HostStream {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.inner.as_raw_fd()
    }
}

impl From<TcpStream> for HostStream {
    fn from(stream: TcpStream) -> Self {
        Self::from_tcp(stream)
    }
}

impl std::fmt::Debug for HostStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("HostStream");
        dbg.field("type", &"tcp");
        if let Ok(addr) = self.inner.peer_addr() {
            dbg.field("peer", &addr);
        }
        dbg.finish()
    }
}
