//! Pluggable payload encodings.
//!
//! The dispatcher, pending table and I/O loops only ever see [`Envelope`]s;
//! turning them into frame payloads is the job of a [`WireCodec`]. Two
//! encodings of the same model are provided:
//!
//! - [`JsonCodec`]: JSON-RPC 2.0 shaped objects
//! - [`BinaryCodec`]: compact postcard encoding

use std::str::FromStr;
use std::sync::Arc;

use crate::envelope::Envelope;
use crate::tool::ToolMessage;

pub mod binary;
pub mod json;

pub use binary::BinaryCodec;
pub use json::JsonCodec;

/// Errors that can occur while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary serialization/deserialization error.
    #[error("binary codec error: {0}")]
    Binary(#[from] postcard::Error),

    /// Bytes were left over after a complete message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Unknown message kind discriminator.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// A byte payload could not be embedded in a JSON message.
    #[error("payload is not JSON text ({0} bytes)")]
    NotJson(usize),

    /// Structurally invalid message.
    #[error("malformed message: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Serialization interface between the RPC core and the wire.
pub trait WireCodec: Send + Sync + 'static {
    /// Codec name, for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Encode an envelope into one frame payload.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>>;

    /// Decode one frame payload into an envelope.
    fn decode(&self, payload: &[u8]) -> Result<Envelope>;

    /// Encode a tool sub-message (request params or response payload).
    fn encode_tool(&self, message: &ToolMessage) -> Result<Vec<u8>>;

    /// Decode a tool sub-message.
    fn decode_tool(&self, payload: &[u8]) -> Result<ToolMessage>;
}

/// Selector for the built-in codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    #[default]
    Json,
    Binary,
}

impl CodecKind {
    /// Instantiate the selected codec.
    pub fn build(self) -> Arc<dyn WireCodec> {
        match self {
            CodecKind::Json => Arc::new(JsonCodec),
            CodecKind::Binary => Arc::new(BinaryCodec),
        }
    }
}

impl FromStr for CodecKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(CodecKind::Json),
            "binary" => Ok(CodecKind::Binary),
            other => Err(CodecError::UnknownKind(format!("codec '{other}'"))),
        }
    }
}
