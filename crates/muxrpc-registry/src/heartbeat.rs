//! Server-side heartbeat helper.

use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{info, warn};

use muxrpc_common::{MuxrpcError, Result};

use crate::registry::{DEFAULT_TIMEOUT, SERVER_HEADER};

/// Registers `addr` with the registry and keeps it registered.
///
/// Sends one heartbeat immediately (the returned result is that first
/// send), then spawns a background task repeating it every `period` until
/// a send fails. A zero period defaults to the registry TTL minus a
/// one-minute margin, leaving enough slack for the next beat to land
/// before eviction.
pub async fn heartbeat(registry: &str, addr: &str, period: Duration) -> Result<()> {
    let period = if period.is_zero() {
        DEFAULT_TIMEOUT - Duration::from_secs(60)
    } else {
        period
    };

    send_heartbeat(registry, addr).await?;

    let registry = registry.to_string();
    let addr = addr.to_string();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // the immediate tick; the first beat was already sent
        loop {
            ticker.tick().await;
            if let Err(e) = send_heartbeat(&registry, &addr).await {
                warn!("heartbeat to {} failed: {}", registry, e);
                break;
            }
        }
    });
    Ok(())
}

/// One POST to the registry carrying the server address header.
async fn send_heartbeat(registry: &str, addr: &str) -> Result<()> {
    info!("{} send heartbeat to registry {}", addr, registry);

    let request = Request::builder()
        .method("POST")
        .uri(registry)
        .header(SERVER_HEADER, addr)
        .body(Full::new(Bytes::new()))
        .map_err(|e| MuxrpcError::Registry(format!("failed to build request: {e}")))?;

    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let response = client
        .request(request)
        .await
        .map_err(|e| MuxrpcError::Registry(format!("heartbeat failed: {e}")))?;

    if !response.status().is_success() {
        return Err(MuxrpcError::Registry(format!(
            "heartbeat rejected: {}",
            response.status()
        )));
    }
    Ok(())
}
