//! muxrpc Transport Layer
//!
//! Length-prefixed framing plus the pluggable codec that fills the frames.
//!
//! # Wire format
//!
//! ```text
//! [4-byte length as u32 big-endian] [payload]
//! ```
//!
//! Frames are readable (and discardable) without engaging the codec, which
//! is what lets a receiver skip the body of a response it no longer wants
//! while keeping the stream's framing intact. All frame helpers enforce a
//! maximum payload size to prevent allocation of excessively large buffers.

pub mod codec;
pub mod frame;

pub use codec::CodecKind;
pub use frame::{discard_frame, read_frame, write_frame, MAX_FRAME_SIZE};

#[cfg(test)]
mod tests;
