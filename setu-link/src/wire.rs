//! Wire format and framing
//!
//! Every frame on the link is length-prefixed:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON or Postcard binary  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - **Length field**: 4-byte big-endian unsigned integer
//! - **Maximum payload**: 1 MiB; an oversized length closes the connection
//! - **Handshake**: the `Hello`/`Welcome` exchange is always JSON; all
//!   frames after `Welcome` use the format it advertises
//!
//! ## Wire formats
//!
//! - **Json** (default): human-readable, debuggable from any language
//! - **Postcard**: compact binary for production scan streaming

use crate::error::{LinkError, Result};
use crate::messages::Frame;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

/// Maximum frame payload size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    Postcard,
    /// JSON format - human-readable for debugging
    #[default]
    Json,
}

impl WireFormat {
    /// Parse a config-file name ("postcard" or "json")
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "postcard" => Some(Self::Postcard),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Serializer that can handle both formats
#[derive(Clone)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// Serialize a frame to payload bytes
    pub fn serialize(&self, frame: &Frame) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(frame).map_err(|e| LinkError::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(frame).map_err(|e| LinkError::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize payload bytes to a frame
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Frame> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| LinkError::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| LinkError::Serialization(e.to_string()))
            }
        }
    }
}

/// Write one length-prefixed frame payload
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(LinkError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read one length-prefixed frame payload into `buffer`
///
/// `buffer` is resized to the payload length; reusing one buffer across
/// calls avoids per-frame allocation. EOF at a frame boundary (or inside
/// one) maps to [`LinkError::Disconnected`].
pub fn read_frame<R: Read>(reader: &mut R, buffer: &mut Vec<u8>) -> Result<usize> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).map_err(map_eof)?;

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(LinkError::FrameTooLarge(len));
    }

    buffer.resize(len, 0);
    reader.read_exact(buffer).map_err(map_eof)?;
    Ok(len)
}

fn map_eof(e: std::io::Error) -> LinkError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            LinkError::Disconnected
        }
        _ => LinkError::Io(e),
    }
}
