//! Agent-side RPC engine for workloads attached to a spear host.
//!
//! One TCP connection to the host carries length-prefixed frames in both
//! directions. Both sides issue requests: the agent calls host services with
//! [`HostAgent::exec_request`], and the host invokes the agent's registered
//! handlers and tools.
//!
//! Threads per connection:
//! - a writer draining the bounded outbound queue onto the socket
//! - a reader decoding frames into [`Envelope`]s
//! - the dispatcher (the caller of [`HostAgent::run`]) routing each envelope
//! - one worker per executing handler or tool, bounded by admission control
//!
//! [`HostAgent::stop`] (or a Terminate signal from the host) refuses new
//! requests, waits for running workers, flushes queued frames and only then
//! closes the socket.

pub mod agent;
pub mod codec;
pub mod config;
mod dispatch;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod inbound;
pub mod inflight;
pub mod outbound;
pub mod pending;
pub mod registry;
pub mod tool;

pub use agent::HostAgent;
pub use codec::{BinaryCodec, CodecError, CodecKind, JsonCodec, WireCodec};
pub use config::{
    AgentConfig, HostTarget, DEFAULT_MAX_INFLIGHT, DEFAULT_OUTBOUND_CAPACITY, ENV_SECRET,
    ENV_SERVICE_ADDR,
};
pub use envelope::{
    Envelope, Request, Response, RpcError, RpcResult, Signal, SignalKind, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND, OK, SHUTTING_DOWN, TOOL_CREATE, TOOL_INVOKE,
    TOO_MANY_REQUESTS,
};
pub use error::{AgentError, Result};
pub use handshake::{read_secret, send_secret, HostSecret};
pub use registry::Handler;
pub use tool::{Tool, ToolId, ToolMessage, ToolParamSpec, ToolParams, ToolSpec};
