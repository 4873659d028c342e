//! Registry-backed discovery.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use muxrpc_client::{Discovery, MultiServersDiscovery, SelectMode};
use muxrpc_common::{MuxrpcError, Result};

use crate::registry::SERVERS_HEADER;

/// How long a fetched server list stays fresh before the next lazy poll.
pub const DEFAULT_UPDATE_WINDOW: Duration = Duration::from_secs(10);

/// Discovery that polls a [`Registry`](crate::Registry) for live servers.
///
/// Selection itself is delegated to an inner [`MultiServersDiscovery`];
/// this wrapper only keeps the list fresh: `get` and `get_all` re-fetch
/// from the registry when the last update is older than the window, and a
/// manual `update` counts as fresh.
pub struct RegistryDiscovery {
    inner: MultiServersDiscovery,
    registry: String,
    update_window: Duration,
    last_update: Mutex<Option<Instant>>,
}

impl RegistryDiscovery {
    /// `registry` is the full endpoint URL, e.g.
    /// `http://127.0.0.1:9999/_muxrpc_/registry`. A zero `update_window`
    /// falls back to the default.
    pub fn new(registry: impl Into<String>, update_window: Duration) -> Self {
        let update_window = if update_window.is_zero() {
            DEFAULT_UPDATE_WINDOW
        } else {
            update_window
        };
        RegistryDiscovery {
            inner: MultiServersDiscovery::new(Vec::new()),
            registry: registry.into(),
            update_window,
            last_update: Mutex::new(None),
        }
    }

    fn is_fresh(&self) -> bool {
        match *self.last_update.lock().unwrap() {
            Some(at) => at.elapsed() < self.update_window,
            None => false,
        }
    }

    fn mark_fresh(&self) {
        *self.last_update.lock().unwrap() = Some(Instant::now());
    }

    async fn ensure_fresh(&self) -> Result<()> {
        if self.is_fresh() {
            return Ok(());
        }
        self.refresh().await
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    /// Fetches the live server list from the registry and replaces the
    /// inner list with it.
    async fn refresh(&self) -> Result<()> {
        let request = Request::builder()
            .method("GET")
            .uri(&self.registry)
            .body(Full::new(Bytes::new()))
            .map_err(|e| MuxrpcError::Registry(format!("failed to build request: {e}")))?;

        let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
        let response = client
            .request(request)
            .await
            .map_err(|e| MuxrpcError::Registry(format!("refresh failed: {e}")))?;

        let servers: Vec<String> = response
            .headers()
            .get(SERVERS_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        debug!(count = servers.len(), "registry refresh");
        self.inner.update(servers).await?;
        self.mark_fresh();
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        self.inner.update(servers).await?;
        self.mark_fresh();
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.ensure_fresh().await?;
        self.inner.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.ensure_fresh().await?;
        self.inner.get_all().await
    }
}
