//! End-to-End Integration Harness: scheduler → UDP bus → chat hub cascade.
//!
//! The full glue path of a sync delta:
//!   1. A fake catalog source reports three new entries.
//!   2. The sync task posts a `new_comics` notification to the UDP trigger.
//!   3. The UDP bus fans the datagram out to a registered peer AND mirrors
//!      it to the chat hub, whose `global-notifications` room broadcasts a
//!      `notification` frame with the same message.
//!   4. An empty initial pass posts `sync_complete` instead.

use mh_protocol::ChatEvent;
use mh_test_utils::{test_token, MockUdpClient, MockWsClient, TEST_JWT_SECRET};
use scheduler::{CatalogItem, CatalogSource, MemoryCatalog, SourceError, SyncTask, TriggerNotifier};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fake catalog source
// ---------------------------------------------------------------------------

struct FakeSource {
    items: Vec<CatalogItem>,
}

impl CatalogSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn delta_kind(&self) -> &'static str {
        mh_protocol::kinds::NEW_COMICS
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<CatalogItem>, SourceError> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}

fn items(n: usize) -> Vec<CatalogItem> {
    (0..n)
        .map(|i| CatalogItem {
            id: format!("id-{i}"),
            title: format!("title-{i}"),
            latest_chapter: Some(1),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Harness helpers
// ---------------------------------------------------------------------------

async fn start_chat_hub() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind hub listener");
    let addr = listener.local_addr().unwrap();
    let (hub, notify_rx) = chat_hub::Hub::new();
    tokio::spawn(async move {
        hub.room(chat_hub::GLOBAL_ROOM).await;
        tokio::spawn(Arc::clone(&hub).run_notification_fanin(notify_rx));
        let state = chat_hub::GatewayState {
            hub,
            jwt_secret: Arc::from(TEST_JWT_SECRET),
        };
        axum::serve(listener, chat_hub::build_router(state))
            .await
            .expect("hub server error");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

async fn start_notify_bus(chat_hub_addr: String) -> (SocketAddr, SocketAddr) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind bus socket");
    let udp_addr = socket.local_addr().unwrap();
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway listener");
    let http_addr = http_listener.local_addr().unwrap();

    let (bus, queue_rx) = notify_bus::NotifyBus::new(socket, Some(chat_hub_addr));
    tokio::spawn(Arc::clone(&bus).run_receiver());
    tokio::spawn(Arc::clone(&bus).run_fanout(queue_rx));
    tokio::spawn(Arc::clone(&bus).run_heartbeat());
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
    (udp_addr, http_addr)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sync_delta_cascades_to_udp_and_global_room() {
    let hub_addr = start_chat_hub().await;
    let (udp_addr, http_addr) = start_notify_bus(format!("http://{hub_addr}")).await;

    // Downstream observers.
    let udp_client = MockUdpClient::bind(udp_addr).await.expect("bind client");
    udp_client.register().await.expect("REGISTER handshake");
    let token = test_token("id-watcher", "watcher");
    let mut ws_client = MockWsClient::connect(
        &hub_addr.to_string(),
        chat_hub::GLOBAL_ROOM,
        &token,
    )
    .await
    .expect("WS connect");

    // The scheduler task: 2s warm-up, then the initial pass finds 3 entries.
    let task = SyncTask::new(
        MemoryCatalog::new(),
        FakeSource { items: items(3) },
        TriggerNotifier::new(&format!("http://{http_addr}")),
    );
    let runner = tokio::spawn(task.run());

    let received = udp_client
        .recv_notification()
        .await
        .expect("delta datagram");
    assert_eq!(received.kind, "new_comics");
    assert!(
        received.message.contains('3'),
        "delta message carries the synced count: {}",
        received.message
    );

    // The same message reaches the global-notifications room.
    let frame = loop {
        match ws_client.recv_event().await.expect("hub frame") {
            ChatEvent::Notification { message, .. } => break message,
            _ => {}
        }
    };
    assert_eq!(frame, received.message);

    runner.abort();
}

#[tokio::test]
async fn empty_initial_pass_posts_sync_complete() {
    let hub_addr = start_chat_hub().await;
    let (udp_addr, http_addr) = start_notify_bus(format!("http://{hub_addr}")).await;

    let udp_client = MockUdpClient::bind(udp_addr).await.expect("bind client");
    udp_client.register().await.expect("REGISTER handshake");

    let task = SyncTask::new(
        MemoryCatalog::new(),
        FakeSource { items: Vec::new() },
        TriggerNotifier::new(&format!("http://{http_addr}")),
    );
    let runner = tokio::spawn(task.run());

    let received = udp_client
        .recv_notification()
        .await
        .expect("sync_complete datagram");
    assert_eq!(received.kind, "sync_complete");

    runner.abort();
}
