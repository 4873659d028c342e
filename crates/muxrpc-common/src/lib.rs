//! muxrpc Protocol and Transport
//!
//! This crate provides the shared protocol definitions and the wire layer
//! for the muxrpc RPC runtime. It is used by every other component:
//!
//! - **Protocol layer**: [`Header`], the handshake [`Options`] record, and
//!   the common error type.
//! - **Transport layer**: length-prefixed framing over any byte stream and
//!   the pluggable [`CodecKind`] serialization.
//!
//! # Wire protocol
//!
//! Every message on a connection is a frame:
//! `[4-byte length prefix as u32 big-endian] + [payload]`.
//!
//! The first frame of a connection is the JSON-encoded [`Options`] record
//! (always JSON: the codec choice is inside the record, so it cannot be
//! used to decode itself). Every subsequent message is a header frame
//! followed by a body frame, both in the negotiated codec. Requests and
//! responses are matched by sequence number, not by arrival order.

pub mod protocol;
pub mod transport;

pub use protocol::{Header, MuxrpcError, Options, Result, MAGIC};
pub use transport::CodecKind;
