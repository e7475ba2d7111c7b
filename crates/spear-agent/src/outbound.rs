use std::collections::VecDeque;
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Condvar, Mutex, PoisonError};

use bytes::Bytes;
use spear_frame::{FrameError, FrameWriter};
use spear_transport::{wait_readable, Notifier};
use tracing::{debug, error, trace, warn};

use crate::error::{AgentError, Result};

const SHUTDOWN_SLOT: usize = 0;
const QUEUE_SLOT: usize = 1;

#[derive(Default)]
struct QueueState {
    items: VecDeque<Bytes>,
    closed: bool,
}

/// Bounded FIFO of encoded payloads waiting for the writer thread.
///
/// Every push writes one byte to the queue's [`Notifier`] so the writer can
/// wait on the queue and the shutdown notifier together.
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    not_full: Condvar,
    capacity: usize,
    ready: Notifier,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(QueueState::default()),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            ready: Notifier::new()?,
        })
    }

    /// Append a payload, blocking while the queue is full.
    ///
    /// Fails with [`AgentError::Stopped`] once the writer has exited.
    pub fn push(&self, payload: Bytes) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            while state.items.len() >= self.capacity && !state.closed {
                state = self
                    .not_full
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.closed {
                return Err(AgentError::Stopped);
            }
            state.items.push_back(payload);
        }
        self.ready.notify()?;
        Ok(())
    }

    /// Take everything currently queued, in FIFO order.
    pub fn take_all(&self) -> VecDeque<Bytes> {
        let items = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut state.items)
        };
        self.not_full.notify_all();
        items
    }

    /// Refuse further pushes and wake blocked producers.
    pub fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear_signal(&self) {
        if let Err(err) = self.ready.drain() {
            warn!(error = %err, "failed to drain outbound notifier");
        }
    }
}

impl AsRawFd for OutboundQueue {
    fn as_raw_fd(&self) -> RawFd {
        self.ready.as_raw_fd()
    }
}

/// Why the writer loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// Shutdown was signalled; queued frames were flushed.
    Shutdown,
    /// Writing to the socket failed; queued frames were discarded.
    Failed,
}

/// Writer loop: move queued payloads onto the socket until shutdown.
///
/// The queue is closed on exit, whatever the reason.
pub fn run_writer<W: Write>(
    mut writer: FrameWriter<W>,
    queue: &OutboundQueue,
    shutdown: &Notifier,
) -> WriterExit {
    let fds = [shutdown.as_raw_fd(), queue.as_raw_fd()];
    let exit = loop {
        let readiness = match wait_readable(&fds, None) {
            Ok(readiness) => readiness,
            Err(err) => {
                error!(error = %err, "writer readiness wait failed");
                break WriterExit::Failed;
            }
        };

        if readiness.is_ready(QUEUE_SLOT) {
            queue.clear_signal();
            if write_queued(&mut writer, queue).is_err() {
                break WriterExit::Failed;
            }
        }

        if readiness.is_ready(SHUTDOWN_SLOT) {
            // Final best-effort drain for anything pushed since the last wake.
            let flushed = write_queued(&mut writer, queue);
            break if flushed.is_ok() {
                WriterExit::Shutdown
            } else {
                WriterExit::Failed
            };
        }
    };

    queue.close();
    let dropped = queue.take_all().len();
    if dropped > 0 {
        warn!(dropped, "discarded queued frames after writer exit");
    }
    debug!(?exit, "writer loop finished");
    exit
}

fn write_queued<W: Write>(
    writer: &mut FrameWriter<W>,
    queue: &OutboundQueue,
) -> std::result::Result<(), FrameError> {
    for payload in queue.take_all() {
        // Payloads were size-checked when enqueued.
        if let Err(err) = writer.send(&payload) {
            error!(error = %err, len = payload.len(), "failed to write frame");
            return Err(err);
        }
        trace!(len = payload.len(), "sent frame");
    }
    Ok(())
}
