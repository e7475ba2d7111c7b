use spear_frame::DEFAULT_MAX_PAYLOAD;

use crate::error::{AgentError, Result};
use crate::handshake::HostSecret;

/// Environment variable holding the host address (`host:port`).
pub const ENV_SERVICE_ADDR: &str = "SERVICE_ADDR";
/// Environment variable holding the decimal handshake secret.
pub const ENV_SECRET: &str = "SECRET";

/// Default ceiling on concurrently executing handler requests.
pub const DEFAULT_MAX_INFLIGHT: usize = 128;
/// Default outbound queue capacity, in frames.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 512;

/// Tunables for a [`HostAgent`](crate::HostAgent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Admission ceiling for handler requests. Tool invocations are not bounded.
    pub max_inflight: usize,
    /// Outbound queue capacity; `exec_request` and workers block when full.
    pub outbound_capacity: usize,
    /// First id handed out to outbound requests.
    pub id_origin: u64,
    /// Largest frame payload accepted or sent.
    pub max_payload_size: usize,
    /// Terminate the process with status 0 once shutdown has drained.
    pub exit_process_on_stop: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            id_origin: 0,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            exit_process_on_stop: false,
        }
    }
}

impl AgentConfig {
    pub fn with_max_inflight(mut self, max_inflight: usize) -> Self {
        self.max_inflight = max_inflight;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn with_id_origin(mut self, origin: u64) -> Self {
        self.id_origin = origin;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn with_exit_process_on_stop(mut self, exit: bool) -> Self {
        self.exit_process_on_stop = exit;
        self
    }
}

/// Where to connect and what secret to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub addr: String,
    pub secret: HostSecret,
}

impl HostTarget {
    pub fn new(addr: impl Into<String>, secret: impl Into<HostSecret>) -> Self {
        Self {
            addr: addr.into(),
            secret: secret.into(),
        }
    }

    /// Read the target from `SERVICE_ADDR` and `SECRET`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the target from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup(ENV_SERVICE_ADDR)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AgentError::Config(format!("{ENV_SERVICE_ADDR} is not set")))?;
        let secret = lookup(ENV_SECRET)
            .ok_or_else(|| AgentError::Config(format!("{ENV_SECRET} is not set")))?
            .parse::<HostSecret>()?;

        Ok(Self {
            addr: addr.trim().to_string(),
            secret,
        })
    }
}
