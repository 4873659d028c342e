use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuxrpcError {
    #[error("connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("call timeout: expect within {0:?}")]
    CallTimeout(Duration),

    #[error("request handle timeout: expect within {0:?}")]
    HandleTimeout(Duration),

    #[error("client is shut down")]
    Shutdown,

    #[error("connection broken: {0}")]
    ConnectionBroken(String),

    #[error("unknown service {0}")]
    UnknownService(String),

    #[error("unknown method {0}")]
    UnknownMethod(String),

    /// Error text returned by a service handler, passed through verbatim.
    /// On the client this carries whatever the response header's error
    /// field said, which includes server-generated texts such as
    /// "request handle timeout".
    #[error("{0}")]
    Handler(String),

    #[error("invalid magic number {0:#x}")]
    BadMagic(u32),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("frame too large: {0} bytes (max {1} bytes)")]
    FrameTooLarge(usize, usize),

    #[error("no available servers")]
    NoAvailableServers,

    #[error("select mode not supported")]
    UnsupportedSelectMode,

    #[error("registry error: {0}")]
    Registry(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary serialization error: {0}")]
    Binary(#[from] postcard::Error),
}

pub type Result<T> = std::result::Result<T, MuxrpcError>;
