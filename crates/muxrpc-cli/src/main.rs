//! muxrpc CLI entry point.
//!
//! ```bash
//! # Start a heartbeat registry
//! muxrpc registry -b 0.0.0.0:7999 --ttl-secs 300
//!
//! # Make an RPC call (outputs raw JSON for scripting)
//! muxrpc call 127.0.0.1:9000 Arith.Sum '{"a": 1, "b": 2}'
//! ```
//!
//! `call` speaks the JSON codec: arbitrary JSON argument values cannot
//! ride a non-self-describing binary codec.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tokio::net::TcpListener;

use muxrpc_client::Client;
use muxrpc_common::Options;
use muxrpc_registry::Registry;

#[derive(FromArgs)]
/// muxrpc: multiplexed RPC runtime
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Registry(RegistryArgs),
    Call(CallArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "registry")]
/// start a heartbeat registry
struct RegistryArgs {
    /// address to bind the registry to
    #[argh(option, short = 'b', default = "\"0.0.0.0:7999\".into()")]
    bind: String,

    /// mount path for the registry endpoint
    #[argh(option, default = "muxrpc_registry::DEFAULT_PATH.into()")]
    path: String,

    /// seconds before a silent server is evicted; 0 disables eviction
    #[argh(option, default = "300")]
    ttl_secs: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make an RPC call and print the raw JSON reply
struct CallArgs {
    /// server address, e.g. 127.0.0.1:9000
    #[argh(positional)]
    addr: String,

    /// call target, "Service.Method"
    #[argh(positional)]
    service_method: String,

    /// JSON-encoded argument value
    #[argh(positional, default = "\"null\".into()")]
    args: String,

    /// per-call timeout in milliseconds; 0 waits indefinitely
    #[argh(option, default = "0")]
    timeout_ms: u64,
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn run_registry(args: RegistryArgs) -> Result<()> {
    let registry = Arc::new(Registry::new(Duration::from_secs(args.ttl_secs)));
    let listener = TcpListener::bind(&args.bind).await?;
    registry.serve(listener, &args.path).await?;
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(&args.args)?;
    let client = Client::dial(&args.addr, Options::default()).await?;

    let reply: serde_json::Value = client
        .call_timeout(
            &args.service_method,
            &value,
            Duration::from_millis(args.timeout_ms),
        )
        .await?;
    client.close().await;

    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli: Cli = argh::from_env();
    match cli.command {
        Command::Registry(args) => run_registry(args).await,
        Command::Call(args) => run_call(args).await,
    }
}
