//! TCP transport for the spear agent.
//!
//! This is the lowest layer of the agent stack:
//! - [`HostStream`], the single connection to the host
//! - [`connect`], address resolution and connect with typed errors
//! - [`wait_readable`], a readiness wait over several descriptors (`poll(2)`)
//! - [`Notifier`], a byte-signalling channel that can sit in the same
//!   readiness wait as the socket
//!
//! Readiness waits and notifiers are Unix-only.

pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod notify;
#[cfg(unix)]
pub mod poll;

pub use error::{Result, TransportError};
pub use stream::HostStream;
pub use tcp::connect;

#[cfg(unix)]
pub use notify::Notifier;
#[cfg(unix)]
pub use poll::{wait_readable, Readiness};
