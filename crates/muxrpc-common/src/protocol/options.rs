use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transport::CodecKind;

/// Protocol magic value; a connection whose first frame does not carry it
/// is not speaking this protocol and gets dropped.
pub const MAGIC: u32 = 0x3bef5c;

/// Default connect timeout applied by [`Options::default`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake record, sent once by the client as the first frame of a fresh
/// connection and immutable afterwards.
///
/// The record is always JSON-encoded on the wire regardless of the codec it
/// negotiates, since the codec choice is carried inside it. Timeouts ride
/// the wire as integer milliseconds; zero means unbounded.
///
/// # Example
///
/// ```
/// use muxrpc_common::{Options, CodecKind};
/// use std::time::Duration;
///
/// let options = Options {
///     codec: CodecKind::Binary,
///     handle_timeout: Duration::from_secs(1),
///     ..Options::default()
/// };
/// assert_eq!(options.magic, muxrpc_common::MAGIC);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Options {
    /// Protocol magic value, validated by the server during handshake
    pub magic: u32,
    /// Codec used for every header/body frame after the handshake
    pub codec: CodecKind,
    /// Bound on connection establishment; zero waits indefinitely
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Server-side bound on a single invocation; zero waits indefinitely
    #[serde(with = "duration_ms")]
    pub handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            magic: MAGIC,
            codec: CodecKind::Json,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
