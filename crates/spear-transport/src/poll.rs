use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Which descriptors became readable in a [`wait_readable`] call.
///
/// Hang-up and error conditions count as readable so the caller's next `read`
/// observes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    ready: Vec<bool>,
}

impl Readiness {
    /// Whether the descriptor at `index` (in the order passed to
    /// [`wait_readable`]) is ready.
    pub fn is_ready(&self, index: usize) -> bool {
        self.ready.get(index).copied().unwrap_or(false)
    }

    /// True when the wait timed out with nothing ready.
    #[cfg(test)]
    fn timed_out(&self) -> bool {
        !self.ready.iter().any(|ready| *ready)
    }
}

/// Block until at least one of `fds` is readable, or `timeout` elapses.
///
/// `None` waits indefinitely. Interrupted waits are restarted.
pub fn wait_readable(fds: &[RawFd], timeout: Option<Duration>) -> Result<Readiness> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let timeout_ms = match timeout {
        None => -1,
        Some(duration) => i32::try_from(duration.as_millis()).unwrap_or(i32::MAX),
    };

    loop {
        // SAFETY: `pollfds` is a valid, exclusively borrowed array of
        // `pollfds.len()` initialised `pollfd` structs for the whole call.
        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if rc >= 0 {
            break;
        }

        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            continue;
        }
        return Err(TransportError::Io(err));
    }

    let wake_mask = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
    Ok(Readiness {
        ready: pollfds
            .iter()
            .map(|pfd| pfd.revents & wake_mask != 0)
            .collect(),
    })
}
