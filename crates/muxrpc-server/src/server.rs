//! Request dispatcher.
//!
//! The server accepts connections, performs the handshake, then runs a
//! read/invoke/write pipeline per connection: requests are read
//! sequentially off the stream, invocations run concurrently, and
//! responses funnel through a single writer task so concurrent results
//! never interleave partial writes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use muxrpc_common::transport::frame;
use muxrpc_common::{CodecKind, Header, MuxrpcError, Options, Result, MAGIC};

use crate::service::Service;

/// Buffered responses per connection before dispatch tasks back-pressure.
const RESPONSE_QUEUE_DEPTH: usize = 32;

/// RPC server: a set of registered services plus the accept loop.
///
/// An explicit instance: create one, register services, hand it a
/// listener. Registration is immutable per service; the set of services
/// may grow until `serve` is called (and technically after, the map is
/// lock-protected).
pub struct Server {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl Server {
    pub fn new() -> Self {
        Server {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a service under its name.
    ///
    /// # Errors
    ///
    /// Rejects a second service with the same name.
    pub fn register(&self, service: Service) -> Result<()> {
        let mut services = self.services.write().unwrap();
        if services.contains_key(service.name()) {
            return Err(MuxrpcError::InvalidRequest(format!(
                "service {} already defined",
                service.name()
            )));
        }
        for method in service.method_names() {
            info!("rpc server: register {}.{}", service.name(), method);
        }
        services.insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    /// Accepts connections forever, spawning one task per connection.
    ///
    /// A failed handshake or a broken connection is logged and dropped;
    /// it never takes the accept loop down.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("rpc server listening on {}", addr);
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection established");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            warn!(%peer, "connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("accept error: {}", e);
                }
            }
        }
    }

    /// Handshake plus the per-connection pipeline.
    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream) -> Result<()> {
        // the first frame is the JSON options record, readable before any
        // codec has been negotiated
        let opt_bytes = frame::read_frame(&mut stream).await?;
        let options: Options = CodecKind::Json.decode(&opt_bytes)?;
        if options.magic != MAGIC {
            return Err(MuxrpcError::BadMagic(options.magic));
        }
        let codec = options.codec;
        let handle_timeout = options.handle_timeout;

        let (mut reader, writer) = stream.into_split();
        let (response_tx, response_rx) = mpsc::channel(RESPONSE_QUEUE_DEPTH);
        let write_task = tokio::spawn(write_loop(response_rx, writer, codec));

        let result = self
            .read_loop(&mut reader, codec, handle_timeout, response_tx)
            .await;

        // response_tx is gone; the writer drains what dispatch tasks still
        // hold and then exits
        let _ = write_task.await;
        result
    }

    /// Reads requests sequentially and fans each one out to its own
    /// dispatch task.
    async fn read_loop(
        &self,
        reader: &mut OwnedReadHalf,
        codec: CodecKind,
        handle_timeout: Duration,
        response_tx: mpsc::Sender<(Header, Vec<u8>)>,
    ) -> Result<()> {
        loop {
            let header_bytes = match frame::read_frame(reader).await {
                Ok(bytes) => bytes,
                Err(MuxrpcError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("connection closed by peer");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let header: Header = codec.decode(&header_bytes)?;
            let body = frame::read_frame(reader).await?;

            match self.lookup(&header.service_method) {
                Err(e) => {
                    // unknown service/method keeps the connection alive
                    let response =
                        Header::with_error(&header.service_method, header.seq, e.to_string());
                    if response_tx.send((response, Vec::new())).await.is_err() {
                        return Ok(());
                    }
                }
                Ok((service, method)) => {
                    let response_tx = response_tx.clone();
                    tokio::spawn(async move {
                        let response =
                            dispatch(service, method, header, body, codec, handle_timeout).await;
                        let _ = response_tx.send(response).await;
                    });
                }
            }
        }
    }

    /// Splits `"ServiceName.MethodName"` and resolves the service.
    fn lookup(&self, service_method: &str) -> Result<(Arc<Service>, String)> {
        let (service_name, method_name) = service_method.split_once('.').ok_or_else(|| {
            MuxrpcError::InvalidRequest(format!(
                "service/method request ill-formed: {service_method}"
            ))
        })?;
        let services = self.services.read().unwrap();
        let service = services
            .get(service_name)
            .cloned()
            .ok_or_else(|| MuxrpcError::UnknownService(service_name.to_string()))?;
        Ok((service, method_name.to_string()))
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// Invokes one request, optionally bounded by the handle timeout.
///
/// Invocation runs on the blocking pool; when the timeout fires first the
/// caller gets the timeout error while the invocation itself keeps running
/// unawaited; it is never preempted.
async fn dispatch(
    service: Arc<Service>,
    method: String,
    header: Header,
    body: Vec<u8>,
    codec: CodecKind,
    handle_timeout: Duration,
) -> (Header, Vec<u8>) {
    let Header {
        service_method,
        seq,
        ..
    } = header;

    let invocation = tokio::task::spawn_blocking(move || service.call(&method, codec, &body));

    let joined = if handle_timeout.is_zero() {
        invocation.await
    } else {
        match tokio::time::timeout(handle_timeout, invocation).await {
            Ok(joined) => joined,
            Err(_) => {
                let error = MuxrpcError::HandleTimeout(handle_timeout).to_string();
                return (Header::with_error(service_method, seq, error), Vec::new());
            }
        }
    };

    match joined {
        Ok(Ok(reply)) => (Header::new(service_method, seq), reply),
        Ok(Err(e)) => (
            Header::with_error(service_method, seq, e.to_string()),
            Vec::new(),
        ),
        Err(e) => (
            Header::with_error(service_method, seq, format!("handler panicked: {e}")),
            Vec::new(),
        ),
    }
}

/// Single writer per connection: every response goes through here, so
/// concurrent dispatch tasks never interleave bytes on the stream.
async fn write_loop(
    mut responses: mpsc::Receiver<(Header, Vec<u8>)>,
    mut writer: OwnedWriteHalf,
    codec: CodecKind,
) {
    while let Some((header, body)) = responses.recv().await {
        let header_bytes = match codec.encode(&header) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("response encode failed: {}", e);
                continue;
            }
        };
        let write = async {
            frame::write_frame(&mut writer, &header_bytes).await?;
            frame::write_frame(&mut writer, &body).await?;
            writer.flush().await?;
            Ok::<_, MuxrpcError>(())
        };
        if let Err(e) = write.await {
            warn!("response write failed: {}", e);
            break;
        }
    }
}
