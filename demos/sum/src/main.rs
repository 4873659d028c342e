use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use muxrpc_client::{MultiServersDiscovery, SelectMode, XClient};
use muxrpc_common::Options;
use muxrpc_server::{Server, Service};

#[derive(Debug, Serialize, Deserialize, Default)]
struct AddArgs {
    a: i64,
    b: i64,
}

struct Arith;

async fn start_server() -> anyhow::Result<String> {
    let service = Service::builder("Arith", Arith)
        .method("Sum", |_: &Arith, args: AddArgs, reply: &mut i64| {
            *reply = args.a + args.b;
            Ok(())
        })
        .build()?;

    let server = Arc::new(Server::new());
    server.register(service)?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    Ok(addr)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let a = start_server().await?;
    let b = start_server().await?;
    println!("servers listening on {a} and {b}");

    let discovery = MultiServersDiscovery::new(vec![a, b]);
    let xc = XClient::new(discovery, SelectMode::RoundRobin, Options::default());

    for i in 0..4i64 {
        let sum: i64 = xc
            .call(
                "Arith.Sum",
                &AddArgs { a: i, b: i * i },
                Duration::from_secs(1),
            )
            .await?;
        println!("Arith.Sum({i}, {}) = {sum}", i * i);
    }

    let sum: i64 = xc
        .broadcast("Arith.Sum", &AddArgs { a: 40, b: 2 }, Duration::from_secs(1))
        .await?;
    println!("broadcast Arith.Sum(40, 2) = {sum}");

    xc.close().await;
    Ok(())
}
