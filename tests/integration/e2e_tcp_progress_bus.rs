//! End-to-End Integration Harness: TCP Progress Bus.
//!
//! The bus is started in-process (library pieces wired the way the binary
//! wires them, on port 0) and exercised through real sockets:
//!   1. Fan-out of one update to every connected client.
//!   2. PING/PONG liveness round-trip.
//!   3. Keep-alive suppression (empty manga_title never fans out).
//!   4. HTTP trigger injection, bad-JSON 400, wrong-method 405.
//!   5. Health endpoint client count.
//!   6. Single-producer ordering: receivers observe a prefix, in order.

use mh_protocol::{now_unix, ProgressUpdate, TcpHealth, TriggerResponse};
use mh_test_utils::{MockTcpClient, TEST_JWT_SECRET};
use progress_bus::{build_router, GatewayState, ProgressBus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Harness helpers
// ---------------------------------------------------------------------------

/// Wire the bus in-process: fan-out, watchdog, acceptor and gateway, all on
/// loopback port 0. Returns (bus socket addr, gateway addr).
async fn start_progress_bus() -> (SocketAddr, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind bus listener");
    let tcp_addr = listener.local_addr().unwrap();
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway listener");
    let http_addr = http_listener.local_addr().unwrap();

    let (bus, bus_rx) = ProgressBus::new(None);
    tokio::spawn(Arc::clone(&bus).run_fanout(bus_rx));
    tokio::spawn(Arc::clone(&bus).run_watchdog());
    tokio::spawn(Arc::clone(&bus).serve_listener(listener));

    let state = GatewayState {
        bus,
        jwt_secret: Arc::from(TEST_JWT_SECRET),
        sse_keepalive: Duration::from_secs(15),
    };
    tokio::spawn(async move {
        axum::serve(http_listener, build_router(state))
            .await
            .expect("gateway error");
    });
    // Give the tasks a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(20)).await;
    (tcp_addr, http_addr)
}

fn update(title: &str, chapter: u32) -> ProgressUpdate {
    ProgressUpdate {
        user_id: "u1".to_owned(),
        username: "alice".to_owned(),
        manga_title: title.to_owned(),
        chapter,
        timestamp: 0,
        manga_id: None,
    }
}

/// Connecting registers asynchronously; wait until the health count settles.
async fn wait_for_clients(http_addr: SocketAddr, expected: usize) {
    let url = format!("http://{http_addr}/health");
    for _ in 0..50 {
        let health: TcpHealth = reqwest::get(&url)
            .await
            .expect("health request")
            .json()
            .await
            .expect("health body");
        if health.connected_clients == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("client count never reached {expected}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fanout_reaches_every_connected_client() {
    let (tcp_addr, http_addr) = start_progress_bus().await;

    let mut a = MockTcpClient::connect(tcp_addr).await.expect("connect A");
    let mut b = MockTcpClient::connect(tcp_addr).await.expect("connect B");
    let mut c = MockTcpClient::connect(tcp_addr).await.expect("connect C");
    wait_for_clients(http_addr, 3).await;

    let before = now_unix();
    a.send_update(&update("Bleach", 42)).await.expect("send");

    for client in [&mut a, &mut b, &mut c] {
        let received = client.recv_update().await.expect("broadcast line");
        assert_eq!(received.username, "alice");
        assert_eq!(received.manga_title, "Bleach");
        assert_eq!(received.chapter, 42);
        assert!(
            received.timestamp >= before && received.timestamp <= now_unix() + 1,
            "zero timestamp must be stamped with roughly the current time"
        );
    }
}

#[tokio::test]
async fn ping_gets_exactly_pong() {
    let (tcp_addr, _http_addr) = start_progress_bus().await;
    let mut client = MockTcpClient::connect(tcp_addr).await.expect("connect");
    client.ping().await.expect("PING answered with PONG");
}

#[tokio::test]
async fn keepalive_updates_produce_zero_fanout() {
    let (tcp_addr, http_addr) = start_progress_bus().await;

    let mut a = MockTcpClient::connect(tcp_addr).await.expect("connect A");
    let mut b = MockTcpClient::connect(tcp_addr).await.expect("connect B");
    wait_for_clients(http_addr, 2).await;

    a.send_update(&update("", 0)).await.expect("keep-alive");
    a.send_update(&update("Bleach", 7)).await.expect("real update");

    // The first broadcast anyone sees is the real update.
    let received = b.recv_update().await.expect("broadcast");
    assert_eq!(received.chapter, 7);
    let received = a.recv_update().await.expect("broadcast");
    assert_eq!(received.chapter, 7);
}

#[tokio::test]
async fn malformed_frames_keep_the_connection_alive() {
    let (tcp_addr, http_addr) = start_progress_bus().await;

    let mut client = MockTcpClient::connect(tcp_addr).await.expect("connect");
    wait_for_clients(http_addr, 1).await;

    client.send_line("{this is not json").await.expect("send junk");
    client.send_update(&update("Bleach", 3)).await.expect("send valid");

    let received = client.recv_update().await.expect("still connected");
    assert_eq!(received.chapter, 3);
}

#[tokio::test]
async fn trigger_injects_a_broadcast() {
    let (tcp_addr, http_addr) = start_progress_bus().await;

    let mut client = MockTcpClient::connect(tcp_addr).await.expect("connect");
    wait_for_clients(http_addr, 1).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{http_addr}/trigger"))
        .json(&update("One Piece", 1100))
        .send()
        .await
        .expect("trigger request");
    assert_eq!(resp.status(), 200);
    let body: TriggerResponse = resp.json().await.expect("trigger body");
    assert!(body.success);
    assert_eq!(body.clients, 1);

    let received = client.recv_update().await.expect("broadcast");
    assert_eq!(received.manga_title, "One Piece");
    assert_eq!(received.chapter, 1100);
}

#[tokio::test]
async fn trigger_rejects_bad_json_and_wrong_method() {
    let (tcp_addr, http_addr) = start_progress_bus().await;

    let mut client = MockTcpClient::connect(tcp_addr).await.expect("connect");
    wait_for_clients(http_addr, 1).await;

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("http://{http_addr}/trigger"))
        .body("{definitely not json")
        .send()
        .await
        .expect("bad trigger request");
    assert_eq!(resp.status(), 400, "undecodable body is a 400");

    let resp = http
        .get(format!("http://{http_addr}/trigger"))
        .send()
        .await
        .expect("GET trigger");
    assert_eq!(resp.status(), 405, "only POST is allowed");

    // Nothing was broadcast: the next frame the client sees is this one.
    http.post(format!("http://{http_addr}/trigger"))
        .json(&update("Bleach", 9))
        .send()
        .await
        .expect("valid trigger");
    let received = client.recv_update().await.expect("broadcast");
    assert_eq!(received.chapter, 9, "bad trigger must not fan out");
}

#[tokio::test]
async fn health_tracks_connect_and_disconnect() {
    let (tcp_addr, http_addr) = start_progress_bus().await;

    let a = MockTcpClient::connect(tcp_addr).await.expect("connect A");
    let _b = MockTcpClient::connect(tcp_addr).await.expect("connect B");
    wait_for_clients(http_addr, 2).await;

    drop(a);
    wait_for_clients(http_addr, 1).await;
}

#[tokio::test]
async fn single_producer_order_is_preserved() {
    let (tcp_addr, http_addr) = start_progress_bus().await;

    let mut producer = MockTcpClient::connect(tcp_addr).await.expect("producer");
    let mut receiver = MockTcpClient::connect(tcp_addr).await.expect("receiver");
    wait_for_clients(http_addr, 2).await;

    for chapter in 1..=50u32 {
        producer
            .send_update(&update("Bleach", chapter))
            .await
            .expect("send");
    }

    for chapter in 1..=50u32 {
        let received = receiver.recv_update().await.expect("broadcast");
        assert_eq!(
            received.chapter, chapter,
            "receivers observe the producer's order, no reorder, no duplication"
        );
    }
}
