use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::protocol::error::Result;

/// Codec negotiated per connection through the handshake record.
///
/// Both ends must agree on the kind; the server rejects a connection whose
/// handshake it cannot read. The enum allows for future extensibility
/// (e.g. MessagePack, CBOR) without touching the wire framing.
///
/// # Example
///
/// ```
/// use muxrpc_common::{CodecKind, Header};
///
/// let codec = CodecKind::Binary;
/// let header = Header::new("Arith.Sum", 7);
///
/// let bytes = codec.encode(&header).unwrap();
/// let decoded: Header = codec.decode(&bytes).unwrap();
/// assert_eq!(header, decoded);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Self-describing JSON via `serde_json`
    Json,
    /// Compact tagged binary via `postcard`
    Binary,
}

impl CodecKind {
    /// Encodes a value into a frame payload.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            CodecKind::Json => Ok(serde_json::to_vec(value)?),
            CodecKind::Binary => Ok(postcard::to_stdvec(value)?),
        }
    }

    /// Decodes a value from a frame payload.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            CodecKind::Json => Ok(serde_json::from_slice(data)?),
            CodecKind::Binary => Ok(postcard::from_bytes(data)?),
        }
    }
}
