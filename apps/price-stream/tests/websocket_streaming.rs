//! WebSocket Streaming Integration Tests
//!
//! Runs the real HTTP server on an ephemeral port and talks to it with
//! WebSocket clients.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use price_stream::{HttpServer, StreamConfig, StreamService};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    service: StreamService,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Start a server on a random port with a fast tick.
async fn setup_test_server() -> TestServer {
    let mut config = StreamConfig::default();
    config.broadcast.tick_interval = Duration::from_millis(50);

    let cancel = CancellationToken::new();
    let service = StreamService::with_random_walk(&config, cancel.clone());

    let server = HttpServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        service.router(),
        cancel.clone(),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        server.run().await.unwrap();
    });

    TestServer {
        addr,
        service,
        cancel,
        handle,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

/// Next JSON text frame, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_update(client: &mut Client) -> Value {
    loop {
        let frame = next_json(client).await;
        if frame["type"] == "price_update" {
            return frame;
        }
    }
}

async fn eventually(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn client_receives_welcome_then_updates() {
    let server = setup_test_server().await;
    let mut client = connect(server.addr).await;

    let welcome = next_json(&mut client).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["tick_interval_ms"], 50);
    assert_eq!(welcome["instruments"].as_array().unwrap().len(), 5);

    let update = next_update(&mut client).await;
    assert!(update["instrument"].is_string());
    assert!(update["price"].as_str().unwrap().parse::<f64>().unwrap() > 0.0);
    assert!(update["timestamp"].is_string());

    server.cancel.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn broadcast_lifecycle_follows_clients() {
    let server = setup_test_server().await;
    let registry = server.service.registry();
    assert!(!registry.is_broadcasting());

    let mut first = connect(server.addr).await;
    next_json(&mut first).await;
    assert!(registry.is_broadcasting());

    let mut second = connect(server.addr).await;
    next_json(&mut second).await;
    assert_eq!(registry.active_count(), 2);

    first.close(None).await.unwrap();
    eventually(|| registry.active_count() == 1).await;
    assert!(registry.is_broadcasting());

    second.close(None).await.unwrap();
    eventually(|| registry.active_count() == 0).await;
    assert!(!registry.is_broadcasting());

    server.cancel.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn all_clients_see_same_updates() {
    let server = setup_test_server().await;

    let mut early = connect(server.addr).await;
    next_json(&mut early).await;
    let mut late = connect(server.addr).await;
    next_json(&mut late).await;

    let reference = next_update(&mut late).await;

    let mut matched = false;
    for _ in 0..20 {
        if next_update(&mut early).await == reference {
            matched = true;
            break;
        }
    }
    assert!(matched, "early client never saw {reference}");

    let next_late = next_update(&mut late).await;
    let next_early = next_update(&mut early).await;
    assert_eq!(next_late, next_early);

    server.cancel.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn dropped_client_is_deregistered() {
    let server = setup_test_server().await;
    let registry = server.service.registry();

    let mut client = connect(server.addr).await;
    next_json(&mut client).await;
    drop(client);

    eventually(|| registry.active_count() == 0).await;
    assert!(!registry.is_broadcasting());

    server.cancel.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn client_messages_are_ignored() {
    let server = setup_test_server().await;
    let mut client = connect(server.addr).await;
    next_json(&mut client).await;

    client
        .send(Message::text(r#"{"type":"subscribe","instrument":"AAPL"}"#))
        .await
        .unwrap();

    let update = next_update(&mut client).await;
    assert_eq!(update["type"], "price_update");
    assert_eq!(server.service.registry().active_count(), 1);

    server.cancel.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_clients() {
    let server = setup_test_server().await;
    let mut client = connect(server.addr).await;
    next_json(&mut client).await;

    server.cancel.cancel();

    let closed = timeout(WAIT, async {
        while let Some(message) = client.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => {}
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);

    server.handle.await.unwrap();
    server.service.shutdown().await;
    assert!(!server.service.registry().is_broadcasting());
}
