//! Length-prefixed message framing for the spear host/agent protocol.
//!
//! Every message in both directions is framed as:
//! - An 8-byte little-endian unsigned payload length
//! - Exactly that many payload bytes
//!
//! No partial reads reach the caller: [`FrameReader`] blocks (and retries
//! interrupted or would-block reads) until a whole frame is available or the
//! peer closes the connection.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
