//! Routing and broadcast semantics through the XClient façade.

use std::sync::Arc;
use std::time::{Duration, Instant};

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

struct Worker {
    /// When set, `Work` fails immediately instead of answering.
    fail: bool,
    /// Artificial processing delay for `Work`.
    delay: Duration,
}

/// Starts one server whose `Worker.Work` behaves per the config.
async fn start_worker(fail: bool, delay: Duration) -> String {
    let service = Service::builder("Worker", Worker { fail, delay })
        .method("Work", |worker: &Worker, args: AddArgs, reply: &mut i64| {
            if worker.fail {
                return Err("worker unavailable".to_string());
            }
            if !worker.delay.is_zero() {
                std::thread::sleep(worker.delay);
            }
            *reply = args.a + args.b;
            Ok(())
        })
        .build()
        .unwrap();

    let server = Arc::new(Server::new());
    server.register(service).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

fn xclient(addrs: Vec<String>, mode: SelectMode) -> XClient<MultiServersDiscovery> {
    XClient::new(MultiServersDiscovery::new(addrs), mode, Options::default())
}

#[tokio::test]
async fn call_routes_through_discovery() {
    let a = start_worker(false, Duration::ZERO).await;
    let b = start_worker(false, Duration::ZERO).await;
    let xc = xclient(vec![a, b], SelectMode::RoundRobin);

    // several calls round-robin across both servers; all succeed
    for i in 0..6i64 {
        let sum: i64 = xc
            .call("Worker.Work", &AddArgs { a: i, b: 1 }, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(sum, i + 1);
    }
    xc.close().await;
}

#[tokio::test]
async fn call_random_mode_works() {
    let a = start_worker(false, Duration::ZERO).await;
    let b = start_worker(false, Duration::ZERO).await;
    let xc = xclient(vec![a, b], SelectMode::Random);

    for _ in 0..6 {
        let sum: i64 = xc
            .call("Worker.Work", &AddArgs { a: 1, b: 2 }, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(sum, 3);
    }
    xc.close().await;
}

#[tokio::test]
async fn broadcast_returns_a_reply_from_one_target() {
    let a = start_worker(false, Duration::ZERO).await;
    let b = start_worker(false, Duration::ZERO).await;
    let xc = xclient(vec![a, b], SelectMode::RoundRobin);

    let sum: i64 = xc
        .broadcast("Worker.Work", &AddArgs { a: 40, b: 2 }, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(sum, 42);
    xc.close().await;
}

#[tokio::test]
async fn broadcast_first_error_wins() {
    let good = start_worker(false, Duration::ZERO).await;
    let bad = start_worker(true, Duration::ZERO).await;
    let xc = xclient(vec![good, bad], SelectMode::RoundRobin);

    let err = xc
        .broadcast::<_, i64>("Worker.Work", &AddArgs { a: 1, b: 1 }, Duration::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "worker unavailable");
    xc.close().await;
}

#[tokio::test]
async fn broadcast_error_aborts_slow_siblings() {
    let slow = start_worker(false, Duration::from_secs(5)).await;
    let bad = start_worker(true, Duration::ZERO).await;
    let xc = xclient(vec![slow, bad], SelectMode::RoundRobin);

    let start = Instant::now();
    let err = xc
        .broadcast::<_, i64>("Worker.Work", &AddArgs { a: 1, b: 1 }, Duration::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "worker unavailable");
    // the failing target resolves the broadcast without waiting the
    // slow sibling out
    assert!(start.elapsed() < Duration::from_secs(2));
    xc.close().await;
}

#[tokio::test]
async fn broadcast_with_no_servers_reports_none_available() {
    let xc = xclient(Vec::new(), SelectMode::RoundRobin);
    let err = xc
        .broadcast::<_, i64>("Worker.Work", &AddArgs { a: 1, b: 1 }, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no available servers"));
}

#[tokio::test]
async fn unreachable_server_surfaces_as_call_error() {
    // nothing listens on this address
    let xc = xclient(vec!["127.0.0.1:1".to_string()], SelectMode::RoundRobin);
    let err = xc
        .call::<_, i64>("Worker.Work", &AddArgs { a: 1, b: 1 }, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(!err.to_string().is_empty());
    xc.close().await;
}

#[tokio::test]
async fn updated_discovery_list_is_used_by_the_next_call() {
    use muxrpc_client::Discovery;

    let a = start_worker(false, Duration::ZERO).await;
    let b = start_worker(false, Duration::ZERO).await;
    let xc = xclient(vec![a], SelectMode::RoundRobin);

    let sum: i64 = xc
        .call("Worker.Work", &AddArgs { a: 1, b: 1 }, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(sum, 2);

    xc.discovery().update(vec![b]).await.unwrap();
    let sum: i64 = xc
        .call("Worker.Work", &AddArgs { a: 2, b: 2 }, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(sum, 4);
    xc.close().await;
}
