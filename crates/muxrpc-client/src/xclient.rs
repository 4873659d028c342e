//! Routing façade over discovery and a pool of per-address clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::debug;

use muxrpc_common::{MuxrpcError, Options, Result};

use crate::client::Client;
use crate::discovery::{Discovery, SelectMode};

type ClientPool = Arc<Mutex<HashMap<String, Arc<Client>>>>;

/// Load-balancing client.
///
/// Composes a [`Discovery`] source with a lazily-populated pool of
/// [`Client`]s, one per server address. Single calls pick one target
/// through the selection mode; [`broadcast`](XClient::broadcast) fans a
/// call out to every known server.
pub struct XClient<D: Discovery> {
    discovery: D,
    mode: SelectMode,
    options: Options,
    clients: ClientPool,
}

impl<D: Discovery + 'static> XClient<D> {
    pub fn new(discovery: D, mode: SelectMode, options: Options) -> Self {
        XClient {
            discovery,
            mode,
            options,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The underlying discovery source, e.g. for `update`.
    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Calls the named method on one server chosen by the selection mode.
    /// A zero timeout means no deadline.
    pub async fn call<A, R>(&self, service_method: &str, args: &A, timeout: Duration) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let addr = self.discovery.get(self.mode).await?;
        let client = cached_client(&self.clients, self.options, &addr).await?;
        client.call_timeout(service_method, args, timeout).await
    }

    /// Calls the named method on every server known to discovery.
    ///
    /// The first error wins and aborts the still-pending sibling calls
    /// (best-effort: a server already mid-invocation is not stopped); the
    /// first successful reply wins otherwise. Each target gets its own
    /// freshly allocated reply, so no two servers ever write into shared
    /// storage.
    pub async fn broadcast<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let servers = self.discovery.get_all().await?;
        let body = self.options.codec.encode(args)?;

        let mut calls: JoinSet<Result<Vec<u8>>> = JoinSet::new();
        for addr in servers {
            let clients = Arc::clone(&self.clients);
            let options = self.options;
            let service_method = service_method.to_string();
            let body = body.clone();
            calls.spawn(async move {
                let client = cached_client(&clients, options, &addr).await?;
                client.call_raw(&service_method, body, timeout).await
            });
        }

        let mut first_error: Option<MuxrpcError> = None;
        let mut winning_reply: Option<Vec<u8>> = None;
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok(Ok(reply)) => {
                    if winning_reply.is_none() {
                        winning_reply = Some(reply);
                    }
                }
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                        calls.abort_all();
                    }
                }
                Err(join_error) => {
                    if join_error.is_cancelled() {
                        continue;
                    }
                    if first_error.is_none() {
                        first_error = Some(MuxrpcError::Connection(format!(
                            "broadcast task failed: {join_error}"
                        )));
                        calls.abort_all();
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        match winning_reply {
            Some(reply) => self.options.codec.decode(&reply),
            None => Err(MuxrpcError::NoAvailableServers),
        }
    }

    /// Closes and drops every cached client.
    pub async fn close(&self) {
        let mut clients = self.clients.lock().await;
        for (_, client) in clients.drain() {
            client.close().await;
        }
    }
}

/// Returns the pooled client for `addr`, dialing if there is none. A
/// cached client that has become unavailable is closed, evicted and
/// replaced.
async fn cached_client(pool: &ClientPool, options: Options, addr: &str) -> Result<Arc<Client>> {
    let mut clients = pool.lock().await;
    if let Some(client) = clients.get(addr) {
        if client.is_available() {
            return Ok(Arc::clone(client));
        }
        debug!(%addr, "evicting unavailable client");
        if let Some(stale) = clients.remove(addr) {
            stale.close().await;
        }
    }
    let client = Arc::new(Client::dial(addr, options).await?);
    clients.insert(addr.to_string(), Arc::clone(&client));
    Ok(client)
}
