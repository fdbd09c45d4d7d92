//! End-to-End Integration Harness: UDP Notification Bus.
//!
//! The bus is started in-process on loopback port 0 and exercised through
//! real datagrams:
//!   1. REGISTER/REGISTERED handshake and trigger-driven broadcast.
//!   2. Idempotent registration (k REGISTERs leave one registry entry).
//!   3. UNREGISTER removal.
//!   4. Unknown notification kinds pass through verbatim.
//!   5. Gateway misuse: bad JSON 400, wrong method 405.

use mh_protocol::{Notification, TriggerResponse, UdpHealth};
use mh_test_utils::{MockUdpClient, TEST_JWT_SECRET};
use notify_bus::{build_router, GatewayState, NotifyBus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Harness helpers
// ---------------------------------------------------------------------------

/// Wire the bus in-process: receiver, fan-out, heartbeat and gateway, all on
/// loopback port 0. Returns (datagram socket addr, gateway addr).
async fn start_notify_bus(chat_hub_addr: Option<String>) -> (SocketAddr, SocketAddr) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind bus socket");
    let udp_addr = socket.local_addr().unwrap();
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway listener");
    let http_addr = http_listener.local_addr().unwrap();

    let (bus, queue_rx) = NotifyBus::new(socket, chat_hub_addr);
    tokio::spawn(Arc::clone(&bus).run_receiver());
    tokio::spawn(Arc::clone(&bus).run_fanout(queue_rx));
    tokio::spawn(Arc::clone(&bus).run_heartbeat());

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
    tokio::time::sleep(Duration::from_millis(20)).await;
    (udp_addr, http_addr)
}

fn notification(kind: &str, message: &str) -> Notification {
    Notification {
        kind: kind.to_owned(),
        manga_id: "md-1".to_owned(),
        message: message.to_owned(),
        timestamp: 0,
    }
}

async fn client_count(http_addr: SocketAddr) -> usize {
    let health: UdpHealth = reqwest::get(format!("http://{http_addr}/health"))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health body");
    health.udp_clients
}

async fn wait_for_clients(http_addr: SocketAddr, expected: usize) {
    for _ in 0..50 {
        if client_count(http_addr).await == expected {
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
async fn register_then_broadcast_round_trip() {
    let (udp_addr, http_addr) = start_notify_bus(None).await;

    let client = MockUdpClient::bind(udp_addr).await.expect("bind client");
    client.register().await.expect("REGISTER handshake");
    wait_for_clients(http_addr, 1).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{http_addr}/trigger"))
        .json(&notification(
            "chapter_release",
            "New chapter 100 released for Bleach",
        ))
        .send()
        .await
        .expect("trigger request");
    assert_eq!(resp.status(), 200);
    let body: TriggerResponse = resp.json().await.expect("trigger body");
    assert!(body.success);
    assert_eq!(body.clients, 1);

    let received = client.recv_notification().await.expect("datagram");
    assert_eq!(received.kind, "chapter_release");
    assert_eq!(received.message, "New chapter 100 released for Bleach");
    assert!(received.timestamp > 0, "zero timestamp must be stamped");
}

#[tokio::test]
async fn register_is_idempotent() {
    let (udp_addr, http_addr) = start_notify_bus(None).await;

    let client = MockUdpClient::bind(udp_addr).await.expect("bind client");
    for _ in 0..3 {
        client.register().await.expect("REGISTER handshake");
    }
    wait_for_clients(http_addr, 1).await;
    assert_eq!(client_count(http_addr).await, 1);
}

#[tokio::test]
async fn unregister_removes_the_peer() {
    let (udp_addr, http_addr) = start_notify_bus(None).await;

    let client = MockUdpClient::bind(udp_addr).await.expect("bind client");
    client.register().await.expect("REGISTER handshake");
    wait_for_clients(http_addr, 1).await;

    client.unregister().await.expect("UNREGISTER");
    wait_for_clients(http_addr, 0).await;
}

#[tokio::test]
async fn unknown_kinds_are_broadcast_verbatim() {
    let (udp_addr, http_addr) = start_notify_bus(None).await;

    let client = MockUdpClient::bind(udp_addr).await.expect("bind client");
    client.register().await.expect("REGISTER handshake");
    wait_for_clients(http_addr, 1).await;

    reqwest::Client::new()
        .post(format!("http://{http_addr}/trigger"))
        .json(&notification("mystery_kind", "something new"))
        .send()
        .await
        .expect("trigger request");

    let received = client.recv_notification().await.expect("datagram");
    assert_eq!(received.kind, "mystery_kind");
}

#[tokio::test]
async fn trigger_rejects_bad_json_and_wrong_method() {
    let (udp_addr, http_addr) = start_notify_bus(None).await;

    let client = MockUdpClient::bind(udp_addr).await.expect("bind client");
    client.register().await.expect("REGISTER handshake");
    wait_for_clients(http_addr, 1).await;

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("http://{http_addr}/trigger"))
        .body("not json at all")
        .send()
        .await
        .expect("bad trigger request");
    assert_eq!(resp.status(), 400);

    let resp = http
        .get(format!("http://{http_addr}/trigger"))
        .send()
        .await
        .expect("GET trigger");
    assert_eq!(resp.status(), 405);

    // Nothing was broadcast: the next datagram is the valid one.
    http.post(format!("http://{http_addr}/trigger"))
        .json(&notification("manga_update", "for real this time"))
        .send()
        .await
        .expect("valid trigger");
    let received = client.recv_notification().await.expect("datagram");
    assert_eq!(received.kind, "manga_update");
}
