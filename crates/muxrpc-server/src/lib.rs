//! muxrpc Server
//!
//! The server side of the RPC runtime: a registration table exposing
//! arbitrary receiver objects as named services, and the per-connection
//! dispatcher that decodes, invokes and answers requests.
//!
//! # Example
//!
//! ```no_run
//! use muxrpc_server::{Server, Service};
//! use std::sync::Arc;
//!
//! struct Arith;
//!
//! # #[tokio::main]
//! # async fn main() -> muxrpc_common::Result<()> {
//! let service = Service::builder("Arith", Arith)
//!     .method("Sum", |_arith: &Arith, args: (i64, i64), reply: &mut i64| {
//!         *reply = args.0 + args.1;
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let server = Arc::new(Server::new());
//! server.register(service)?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//! server.serve(listener).await
//! # }
//! ```

pub mod server;
pub mod service;

pub use server::Server;
pub use service::{MethodDescriptor, Service, ServiceBuilder};
