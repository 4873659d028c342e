//! Server discovery and selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use rand::Rng;

use muxrpc_common::{MuxrpcError, Result};

/// How one target is chosen from the discovered server set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectMode {
    /// Uniformly random pick per call
    Random,
    /// Cycle through the list in order
    RoundRobin,
}

/// A source of candidate server addresses.
///
/// Implementations range from a static list ([`MultiServersDiscovery`]) to
/// registry-backed variants that poll a remote source in `refresh`.
/// External implementations matching on [`SelectMode`] should answer
/// unrecognized modes with [`MuxrpcError::UnsupportedSelectMode`].
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Re-fetches the server list from its source, when there is one.
    async fn refresh(&self) -> Result<()>;

    /// Replaces the server list wholesale.
    async fn update(&self, servers: Vec<String>) -> Result<()>;

    /// Picks one server according to `mode`.
    async fn get(&self, mode: SelectMode) -> Result<String>;

    /// Returns a defensive copy of all known servers.
    async fn get_all(&self) -> Result<Vec<String>>;
}

/// Discovery over a manually maintained address list.
pub struct MultiServersDiscovery {
    servers: RwLock<Vec<String>>,
    /// Round-robin cursor; starts at a random offset
    index: AtomicUsize,
}

impl MultiServersDiscovery {
    pub fn new(servers: Vec<String>) -> Self {
        let index = rand::thread_rng().gen_range(0..i32::MAX as usize);
        MultiServersDiscovery {
            servers: RwLock::new(servers),
            index: AtomicUsize::new(index),
        }
    }
}

#[async_trait]
impl Discovery for MultiServersDiscovery {
    /// A static list has nothing to refresh from; this is intentionally
    /// inert and exists so registry-backed variants can poll behind the
    /// same interface.
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        *self.servers.write().unwrap() = servers;
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        let servers = self.servers.read().unwrap();
        let n = servers.len();
        if n == 0 {
            return Err(MuxrpcError::NoAvailableServers);
        }
        match mode {
            SelectMode::Random => Ok(servers[rand::thread_rng().gen_range(0..n)].clone()),
            SelectMode::RoundRobin => {
                // modulus at read time: the list may have shrunk or grown
                // since the cursor last advanced
                let i = self.index.fetch_add(1, Ordering::Relaxed);
                Ok(servers[i % n].clone())
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        Ok(self.servers.read().unwrap().clone())
    }
}
