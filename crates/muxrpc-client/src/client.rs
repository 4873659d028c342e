//! Call multiplexer.
//!
//! One [`Client`] owns one connection. Concurrent callers are multiplexed
//! over it by sequence number: every call registers a one-shot resolution
//! channel in the pending map, sends its header/body frames through the
//! single write path, and waits. One dedicated receive loop, started at
//! creation and alive for the client's lifetime, matches incoming
//! responses back to pending calls; responses may arrive in any order
//! relative to the requests.
//!
//! Every call is resolved exactly once: by its response, by its own
//! timeout, or by the receive loop draining the pending map when the
//! connection dies.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::debug;

use muxrpc_common::transport::frame;
use muxrpc_common::{CodecKind, Header, MuxrpcError, Options, Result};

type ReplySender = oneshot::Sender<Result<Vec<u8>>>;

/// State shared between the calling side and the receive loop.
#[derive(Debug)]
struct Shared {
    codec: CodecKind,
    seq: AtomicU64,
    pending: Mutex<HashMap<u64, ReplySender>>,
    /// The single write path; locking it serializes concurrent senders.
    writer: AsyncMutex<OwnedWriteHalf>,
    /// Set by `close`
    closing: AtomicBool,
    /// Set by the receive loop when the connection dies
    broken: AtomicBool,
}

impl Shared {
    fn remove(&self, seq: u64) -> Option<ReplySender> {
        self.pending.lock().unwrap().remove(&seq)
    }

    /// Resolves every still-pending call with an error.
    fn drain<F>(&self, make_error: F)
    where
        F: Fn() -> MuxrpcError,
    {
        let mut pending = self.pending.lock().unwrap();
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(make_error()));
        }
    }
}

/// RPC client for a single connection.
#[derive(Debug)]
pub struct Client {
    shared: Arc<Shared>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Wraps an established connection: sends the handshake record (the
    /// options frame, no acknowledgement is awaited) and starts the
    /// receive loop.
    pub async fn new(mut stream: TcpStream, options: Options) -> Result<Client> {
        let opt_bytes = CodecKind::Json.encode(&options)?;
        frame::write_frame(&mut stream, &opt_bytes).await?;
        stream.flush().await?;

        let (reader, writer) = stream.into_split();
        let shared = Arc::new(Shared {
            codec: options.codec,
            seq: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            writer: AsyncMutex::new(writer),
            closing: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        });
        let receive_task = tokio::spawn(receive_loop(Arc::clone(&shared), reader));
        Ok(Client {
            shared,
            receive_task: Mutex::new(Some(receive_task)),
        })
    }

    /// Connects and handshakes with the default creation strategy.
    pub async fn dial(addr: &str, options: Options) -> Result<Client> {
        Self::dial_with(
            |stream, options| async move { Client::new(stream, options).await },
            addr,
            options,
        )
        .await
    }

    /// Connects with a pluggable client-creation strategy.
    ///
    /// With `connect_timeout > 0` both the TCP connect and the strategy are
    /// raced against the timer; if the timer fires first the dial fails
    /// with a connect-timeout error, and a client the strategy delivers
    /// late is closed in a detached task rather than leaked. A zero
    /// timeout waits indefinitely.
    pub async fn dial_with<F, Fut>(create: F, addr: &str, options: Options) -> Result<Client>
    where
        F: FnOnce(TcpStream, Options) -> Fut,
        Fut: Future<Output = Result<Client>> + Send + 'static,
    {
        let connect_timeout = options.connect_timeout;
        let stream = if connect_timeout.is_zero() {
            TcpStream::connect(addr).await?
        } else {
            tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| MuxrpcError::ConnectTimeout(connect_timeout))??
        };

        if connect_timeout.is_zero() {
            return create(stream, options).await;
        }

        let mut creation = tokio::spawn(create(stream, options));
        tokio::select! {
            joined = &mut creation => match joined {
                Ok(result) => result,
                Err(e) => Err(MuxrpcError::Connection(format!("client creation failed: {e}"))),
            },
            _ = tokio::time::sleep(connect_timeout) => {
                tokio::spawn(async move {
                    if let Ok(Ok(client)) = creation.await {
                        client.close().await;
                    }
                });
                Err(MuxrpcError::ConnectTimeout(connect_timeout))
            }
        }
    }

    /// True while the client can still accept calls: not closed and not in
    /// the post-failure state the receive loop leaves behind.
    pub fn is_available(&self) -> bool {
        !self.shared.closing.load(Ordering::SeqCst) && !self.shared.broken.load(Ordering::SeqCst)
    }

    /// Calls a remote method and waits for its reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.call_timeout(service_method, args, Duration::ZERO).await
    }

    /// Calls a remote method with a deadline; zero means unbounded.
    ///
    /// On expiry the pending entry is removed and the call resolves with a
    /// call-timeout error; a response arriving later misses the lookup in
    /// the receive loop and is discarded silently.
    pub async fn call_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let body = self.shared.codec.encode(args)?;
        let reply = self.call_raw(service_method, body, timeout).await?;
        self.shared.codec.decode(&reply)
    }

    /// Untyped call: pre-encoded argument bytes in, reply bytes out.
    pub(crate) async fn call_raw(
        &self,
        service_method: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let (seq, receiver) = self.issue(service_method, &body).await?;

        if timeout.is_zero() {
            return match receiver.await {
                Ok(outcome) => outcome,
                Err(_) => Err(MuxrpcError::ConnectionBroken(
                    "reply channel dropped".to_string(),
                )),
            };
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(MuxrpcError::ConnectionBroken(
                "reply channel dropped".to_string(),
            )),
            Err(_) => {
                self.shared.remove(seq);
                Err(MuxrpcError::CallTimeout(timeout))
            }
        }
    }

    /// Registers a pending call and sends its frames; the returned receiver
    /// fires exactly once with the call's resolution.
    async fn issue(
        &self,
        service_method: &str,
        body: &[u8],
    ) -> Result<(u64, oneshot::Receiver<Result<Vec<u8>>>)> {
        if !self.is_available() {
            return Err(self.unavailable_error());
        }

        let seq = self.shared.seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(seq, tx);

        let header = Header::new(service_method, seq);
        let send = async {
            let header_bytes = self.shared.codec.encode(&header)?;
            let mut writer = self.shared.writer.lock().await;
            frame::write_frame(&mut *writer, &header_bytes).await?;
            frame::write_frame(&mut *writer, body).await?;
            writer.flush().await?;
            Ok::<_, MuxrpcError>(())
        };

        if let Err(e) = send.await {
            // the receive loop may have resolved the call concurrently; the
            // send failure only matters if the entry is still ours
            if self.shared.remove(seq).is_some() {
                return Err(e);
            }
        }
        Ok((seq, rx))
    }

    fn unavailable_error(&self) -> MuxrpcError {
        if self.shared.closing.load(Ordering::SeqCst) {
            MuxrpcError::Shutdown
        } else {
            MuxrpcError::ConnectionBroken("connection is unavailable".to_string())
        }
    }

    /// Shuts the client down. Idempotent; every still-pending call resolves
    /// with a shutdown error.
    pub async fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut writer = self.shared.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        if let Some(task) = self.receive_task.lock().unwrap().take() {
            task.abort();
        }
        self.shared.drain(|| MuxrpcError::Shutdown);
    }
}

/// One per client, started at creation, runs for the client's lifetime.
///
/// Reads header/body pairs and resolves the matching pending call. A
/// response whose sequence is no longer pending was cancelled or timed
/// out; its body has already been consumed off the stream, so it is
/// dropped silently. Any read or decode error terminates the loop and
/// resolves everything still pending with a connection-broken error.
async fn receive_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf) {
    let error: MuxrpcError = loop {
        let header_bytes = match frame::read_frame(&mut reader).await {
            Ok(bytes) => bytes,
            Err(e) => break e,
        };
        let header: Header = match shared.codec.decode(&header_bytes) {
            Ok(header) => header,
            Err(e) => break e,
        };
        let body = match frame::read_frame(&mut reader).await {
            Ok(bytes) => bytes,
            Err(e) => break e,
        };

        match shared.remove(header.seq) {
            None => {
                debug!(seq = header.seq, "discarding response for unknown sequence");
            }
            Some(tx) => {
                let outcome = if header.is_error() {
                    Err(MuxrpcError::Handler(header.error))
                } else {
                    Ok(body)
                };
                let _ = tx.send(outcome);
            }
        }
    };

    shared.broken.store(true, Ordering::SeqCst);
    if shared.closing.load(Ordering::SeqCst) {
        shared.drain(|| MuxrpcError::Shutdown);
    } else {
        debug!("receive loop terminated: {}", error);
        let text = error.to_string();
        shared.drain(|| MuxrpcError::ConnectionBroken(text.clone()));
    }
}
