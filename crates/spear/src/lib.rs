//! Workload agent for a spear host.
//!
//! A workload connects to its host over TCP, proves itself with a shared
//! secret and then exchanges length-prefixed RPC frames in both directions.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connect, readiness polling and wakeup notifiers
//! - [`frame`]: 8-byte little-endian length framing
//! - [`agent`]: RPC engine: codecs, dispatch, admission control, tools and shutdown

/// Re-export transport types.
pub mod transport {
    pub use spear_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use spear_frame::*;
}

/// Re-export agent types.
pub mod agent {
    pub use spear_agent::*;
}
