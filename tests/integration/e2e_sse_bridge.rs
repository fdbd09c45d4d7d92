//! End-to-End Integration Harness: SSE bridges on both buses.
//!
//! Each bus is started in-process; an HTTP client consumes the event stream
//! and asserts framing:
//!   1. Missing/invalid token is a 401.
//!   2. `event: connected` arrives first, then `event: message` frames in
//!      fan-out order.
//!   3. The notification bridge carries trigger-injected datagram payloads.

use futures_util::StreamExt;
use mh_protocol::{Notification, ProgressUpdate};
use mh_test_utils::{test_token, TEST_JWT_SECRET};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Harness helpers
// ---------------------------------------------------------------------------

async fn start_progress_bus() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind bus listener");
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway listener");
    let http_addr = http_listener.local_addr().unwrap();

    let (bus, bus_rx) = progress_bus::ProgressBus::new(None);
    tokio::spawn(Arc::clone(&bus).run_fanout(bus_rx));
    tokio::spawn(Arc::clone(&bus).serve_listener(listener));
    let state = progress_bus::GatewayState {
        bus,
        jwt_secret: Arc::from(TEST_JWT_SECRET),
        sse_keepalive: Duration::from_secs(15),
    };
    tokio::spawn(async move {
        axum::serve(http_listener, progress_bus::build_router(state))
            .await
            .expect("gateway error");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    http_addr
}

async fn start_notify_bus() -> SocketAddr {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind bus socket");
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway listener");
    let http_addr = http_listener.local_addr().unwrap();

    let (bus, queue_rx) = notify_bus::NotifyBus::new(socket, None);
    tokio::spawn(Arc::clone(&bus).run_receiver());
    tokio::spawn(Arc::clone(&bus).run_fanout(queue_rx));
    let state = notify_bus::GatewayState {
        bus,
        jwt_secret: Arc::from(TEST_JWT_SECRET),
        sse_keepalive: Duration::from_secs(15),
    };
    tokio::spawn(async move {
        axum::serve(http_listener, notify_bus::build_router(state))
            .await
            .expect("gateway error");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    http_addr
}

/// Open the SSE stream and collect raw body text until `needle` shows up.
async fn read_stream_until(url: &str, needle: &str) -> String {
    let resp = reqwest::get(url).await.expect("SSE request");
    assert_eq!(resp.status(), 200);
    let mut stream = resp.bytes_stream();
    let mut body = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !body.contains(needle) {
        let chunk = tokio::time::timeout_at(deadline, stream.next())
            .await
            .expect("SSE data within deadline")
            .expect("stream still open")
            .expect("chunk");
        body.push_str(&String::from_utf8_lossy(&chunk));
    }
    body
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_sse_requires_a_valid_token() {
    let http_addr = start_progress_bus().await;

    let resp = reqwest::get(format!("http://{http_addr}/api/v1/sse/progress"))
        .await
        .expect("request without token");
    assert_eq!(resp.status(), 401);

    let resp = reqwest::get(format!(
        "http://{http_addr}/api/v1/sse/progress?token=garbage"
    ))
    .await
    .expect("request with bad token");
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn progress_sse_streams_connected_then_messages_in_order() {
    let http_addr = start_progress_bus().await;
    let token = test_token("u1", "alice");
    let url = format!("http://{http_addr}/api/v1/sse/progress?token={token}");

    let reader = tokio::spawn(async move { read_stream_until(&url, "\"chapter\":2").await });
    // Let the subscriber attach before triggering.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let http = reqwest::Client::new();
    for chapter in [1u32, 2] {
        http.post(format!("http://{http_addr}/trigger"))
            .json(&ProgressUpdate {
                user_id: "u1".to_owned(),
                username: "alice".to_owned(),
                manga_title: "Bleach".to_owned(),
                chapter,
                timestamp: 0,
                manga_id: None,
            })
            .send()
            .await
            .expect("trigger");
    }

    let body = reader.await.expect("reader task");
    let connected = body.find("event: connected").expect("connected frame");
    let first = body.find("\"chapter\":1").expect("first update");
    let second = body.find("\"chapter\":2").expect("second update");
    assert!(connected < first, "connected precedes data");
    assert!(first < second, "bridge preserves fan-out order");
    assert!(body.contains("event: message"));
}

#[tokio::test]
async fn notifications_sse_carries_trigger_payloads() {
    let http_addr = start_notify_bus().await;
    let token = test_token("u1", "alice");
    let url = format!("http://{http_addr}/api/v1/sse/notifications?token={token}");

    let reader = tokio::spawn(async move { read_stream_until(&url, "chapter_release").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    reqwest::Client::new()
        .post(format!("http://{http_addr}/trigger"))
        .json(&Notification::new(
            mh_protocol::kinds::CHAPTER_RELEASE,
            "md-1",
            "New chapter 100 released for Bleach".to_owned(),
        ))
        .send()
        .await
        .expect("trigger");

    let body = reader.await.expect("reader task");
    assert!(body.contains("event: connected"));
    assert!(body.contains("event: message"));
    assert!(body.contains("New chapter 100 released for Bleach"));
}
