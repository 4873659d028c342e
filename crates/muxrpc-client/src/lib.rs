//! muxrpc Client
//!
//! The calling side of the RPC runtime, in three layers:
//!
//! - [`Client`]: one connection, many concurrent in-flight calls
//!   multiplexed by sequence number, with connect and per-call timeouts.
//! - [`Discovery`] / [`MultiServersDiscovery`]: the candidate server set
//!   and the selection policy (random / round robin).
//! - [`XClient`]: the routing facade with cached per-address clients, single
//!   calls routed through discovery, and first-error-wins broadcast.
//!
//! # Example
//!
//! ```no_run
//! use muxrpc_client::Client;
//! use muxrpc_common::Options;
//!
//! # #[tokio::main]
//! # async fn main() -> muxrpc_common::Result<()> {
//! let client = Client::dial("127.0.0.1:9000", Options::default()).await?;
//! let sum: i64 = client.call("Arith.Sum", &(1i64, 2i64)).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod discovery;
pub mod xclient;

pub use client::Client;
pub use discovery::{Discovery, MultiServersDiscovery, SelectMode};
pub use xclient::XClient;
