//! muxrpc Registry
//!
//! A heartbeat-based service registry and its client-side pieces:
//!
//! - [`Registry`]: an HTTP key-value store of server address to
//!   last-seen time with TTL eviction, served over plain GET/POST.
//! - [`heartbeat`]: helper for servers to register and keep themselves
//!   alive.
//! - [`RegistryDiscovery`]: a [`Discovery`](muxrpc_client::Discovery)
//!   implementation that polls the registry for the live server list.
//!
//! # Protocol
//!
//! `GET path` answers with the comma-separated live addresses in the
//! `X-Muxrpc-Servers` response header. `POST path` with the server's
//! address in the `X-Muxrpc-Server` request header registers or refreshes
//! it. Entries older than the registry's TTL are dropped on the next GET.

pub mod discovery;
pub mod heartbeat;
pub mod registry;

pub use discovery::RegistryDiscovery;
pub use heartbeat::heartbeat;
pub use registry::{Registry, DEFAULT_PATH, DEFAULT_TIMEOUT, SERVERS_HEADER, SERVER_HEADER};
