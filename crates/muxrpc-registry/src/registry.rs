//! The registry server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

use muxrpc_common::{MuxrpcError, Result};

/// Default mount path for the registry endpoint.
pub const DEFAULT_PATH: &str = "/_muxrpc_/registry";

/// Default TTL before a silent server is evicted.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Response header carrying the comma-separated live server list.
pub const SERVERS_HEADER: &str = "x-muxrpc-servers";

/// Request header carrying the address a server registers under.
pub const SERVER_HEADER: &str = "x-muxrpc-server";

/// Heartbeat registry: server address mapped to last-seen time, with TTL
/// eviction.
pub struct Registry {
    timeout: Duration,
    servers: Mutex<HashMap<String, Instant>>,
}

impl Registry {
    /// Creates a registry; a zero `timeout` disables eviction.
    pub fn new(timeout: Duration) -> Self {
        Registry {
            timeout,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers an address or refreshes its last-seen time.
    pub fn put_server(&self, addr: &str) {
        debug!(%addr, "heartbeat received");
        self.servers
            .lock()
            .unwrap()
            .insert(addr.to_string(), Instant::now());
    }

    /// Returns the sorted list of live addresses, evicting stale entries
    /// along the way.
    pub fn alive_servers(&self) -> Vec<String> {
        let mut servers = self.servers.lock().unwrap();
        let now = Instant::now();
        if !self.timeout.is_zero() {
            servers.retain(|_, last_seen| now.duration_since(*last_seen) < self.timeout);
        }
        let mut alive: Vec<String> = servers.keys().cloned().collect();
        alive.sort();
        alive
    }

    /// Builds the HTTP router serving this registry at `path`.
    pub fn router(self: Arc<Self>, path: &str) -> Router {
        Router::new()
            .route(path, get(get_servers).post(post_server))
            .with_state(self)
    }

    /// Serves the registry on `listener` until the process ends.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, path: &str) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("registry listening on {}{}", addr, path);
        }
        let router = self.router(path);
        axum::serve(listener, router)
            .await
            .map_err(|e| MuxrpcError::Registry(e.to_string()))
    }
}

async fn get_servers(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let alive = registry.alive_servers().join(",");
    ([(SERVERS_HEADER, alive)], StatusCode::OK)
}

async fn post_server(State(registry): State<Arc<Registry>>, headers: HeaderMap) -> StatusCode {
    let addr = headers
        .get(SERVER_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if addr.is_empty() {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    registry.put_server(addr);
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_list() {
        let registry = Registry::new(DEFAULT_TIMEOUT);
        registry.put_server("127.0.0.1:9002");
        registry.put_server("127.0.0.1:9001");
        assert_eq!(
            registry.alive_servers(),
            vec!["127.0.0.1:9001".to_string(), "127.0.0.1:9002".to_string()]
        );
    }

    #[test]
    fn stale_entries_are_evicted_on_read() {
        let registry = Registry::new(Duration::from_millis(20));
        registry.put_server("127.0.0.1:9001");
        std::thread::sleep(Duration::from_millis(40));
        assert!(registry.alive_servers().is_empty());
    }

    #[test]
    fn zero_timeout_disables_eviction() {
        let registry = Registry::new(Duration::ZERO);
        registry.put_server("127.0.0.1:9001");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(registry.alive_servers().len(), 1);
    }

    #[test]
    fn heartbeat_refreshes_last_seen() {
        let registry = Registry::new(Duration::from_millis(60));
        registry.put_server("127.0.0.1:9001");
        std::thread::sleep(Duration::from_millis(40));
        registry.put_server("127.0.0.1:9001");
        std::thread::sleep(Duration::from_millis(40));
        // refreshed halfway through, so still alive
        assert_eq!(registry.alive_servers().len(), 1);
    }
}
