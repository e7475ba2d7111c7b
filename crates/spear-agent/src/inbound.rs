use std::io::Read;
use std::os::fd::AsRawFd;
use std::sync::mpsc::Sender;

use spear_frame::{FrameError, FrameReader};
use spear_transport::{wait_readable, Notifier};
use tracing::{debug, error, info, trace, warn};

use crate::codec::WireCodec;
use crate::envelope::Envelope;

const SHUTDOWN_SLOT: usize = 0;
const SOCKET_SLOT: usize = 1;

/// Why the reader loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Shutdown was signalled, or the dispatcher went away.
    Shutdown,
    /// The host closed the connection.
    PeerClosed,
    /// Reading failed; the stream cannot be resynchronised.
    Failed,
}

/// Reader loop: decode one Envelope per frame and hand it to the dispatcher.
///
/// Undecodable payloads are logged and skipped. Dropping `inbound` on return
/// is what tells the dispatcher the connection is gone.
pub fn run_reader<R: Read + AsRawFd>(
    mut reader: FrameReader<R>,
    codec: &dyn WireCodec,
    inbound: Sender<Envelope>,
    shutdown: &Notifier,
) -> ReaderExit {
    let fds = [shutdown.as_raw_fd(), reader.get_ref().as_raw_fd()];
    let exit = loop {
        let readiness = match wait_readable(&fds, None) {
            Ok(readiness) => readiness,
            Err(err) => {
                error!(error = %err, "reader readiness wait failed");
                break ReaderExit::Failed;
            }
        };

        if readiness.is_ready(SHUTDOWN_SLOT) {
            break ReaderExit::Shutdown;
        }
        if !readiness.is_ready(SOCKET_SLOT) {
            continue;
        }

        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                info!("host closed the connection");
                break ReaderExit::PeerClosed;
            }
            Err(err) => {
                error!(error = %err, "failed to read frame");
                break ReaderExit::Failed;
            }
        };

        match codec.decode(&frame.payload) {
            Ok(envelope) => {
                trace!(kind = envelope.kind(), id = ?envelope.id(), "received envelope");
                if inbound.send(envelope).is_err() {
                    break ReaderExit::Shutdown;
                }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    len = frame.payload.len(),
                    codec = codec.name(),
                    "discarding undecodable frame"
                );
            }
        }
    };

    debug!(?exit, "reader loop finished");
    exit
}
