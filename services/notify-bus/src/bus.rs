//! UDP notification bus core.
//!
//! One datagram per message. Peers drive registration with ASCII control
//! words (`REGISTER`, `UNREGISTER`, `PONG`); the bus answers `REGISTERED`,
//! sends `PING` heartbeats every 30 seconds and evicts peers silent for more
//! than 90 seconds. Broadcasts are JSON `Notification` datagrams.
//!
//! Delivery is best-effort: no receipt, no retry, no compensation for
//! datagram loss. A failed send evicts that peer only.

use mh_protocol::{Notification, udp_control};
use mh_registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::glue::HubGlue;

/// Heartbeat ping cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Peers silent longer than this are evicted by the heartbeat sweep.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(90);
/// Bounded broadcast queue; producers drop (with a warning) when full.
pub const QUEUE_CAPACITY: usize = 256;
/// SSE tap capacity; lagged subscribers skip missed events.
pub const SSE_TAP_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broadcast queue full")]
    QueueFull,
    #[error("broadcast queue closed")]
    Closed,
}

pub struct NotifyBus {
    socket: Arc<UdpSocket>,
    registry: Registry<SocketAddr>,
    queue_tx: mpsc::Sender<Notification>,
    sse_tx: broadcast::Sender<Notification>,
    glue: Option<HubGlue>,
}

impl NotifyBus {
    /// Wrap a bound socket; hand back the queue receiver for [`run_fanout`].
    ///
    /// `chat_hub_addr` enables mirroring every broadcast into the hub's
    /// global-notifications room; `None` disables it.
    ///
    /// [`run_fanout`]: NotifyBus::run_fanout
    pub fn new(
        socket: UdpSocket,
        chat_hub_addr: Option<String>,
    ) -> (Arc<Self>, mpsc::Receiver<Notification>) {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (sse_tx, _) = broadcast::channel(SSE_TAP_CAPACITY);
        let bus = NotifyBus {
            socket: Arc::new(socket),
            registry: Registry::new(),
            queue_tx,
            sse_tx,
            glue: chat_hub_addr.map(HubGlue::new),
        };
        (Arc::new(bus), queue_rx)
    }

    /// Fresh subscription to the SSE tap.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sse_tx.subscribe()
    }

    pub async fn client_count(&self) -> usize {
        self.registry.count().await
    }

    /// Accept a notification for broadcast: stamp a zero timestamp, enqueue,
    /// and kick off the hub cascade. Unknown `type` strings pass through
    /// verbatim. A full queue drops the notification so producers stay live.
    pub fn publish(&self, mut notification: Notification) -> Result<(), PublishError> {
        notification.stamp();
        if let Some(glue) = &self.glue {
            glue.forward_notification(&notification);
        }
        self.queue_tx
            .try_send(notification)
            .map_err(|err| match err {
                TrySendError::Full(_) => PublishError::QueueFull,
                TrySendError::Closed(_) => PublishError::Closed,
            })
    }

    /// Datagram receive loop: control words from anyone, opaque payloads
    /// from registered peers ignored.
    pub async fn run_receiver(self: Arc<Self>) {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let (len, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = %err, "recv_from failed");
                    continue;
                }
            };
            let key = addr.to_string();
            match std::str::from_utf8(&buf[..len]).map(str::trim) {
                Ok(udp_control::REGISTER) => {
                    self.registry.register(&key, addr).await;
                    info!(peer = %key, "client registered");
                    if let Err(err) = self
                        .socket
                        .send_to(udp_control::REGISTERED.as_bytes(), addr)
                        .await
                    {
                        warn!(peer = %key, error = %err, "REGISTERED reply failed");
                    }
                }
                Ok(udp_control::UNREGISTER) => {
                    if self.registry.unregister(&key).await {
                        info!(peer = %key, "client unregistered");
                    }
                }
                Ok(udp_control::PONG) => {
                    self.registry.touch(&key).await;
                }
                Ok(other) => {
                    if self.registry.contains(&key).await {
                        // Opaque payload from a registered peer.
                        debug!(peer = %key, "ignoring datagram from registered peer");
                    } else {
                        debug!(peer = %key, word = other, "datagram from unknown peer");
                    }
                }
                Err(_) => {
                    debug!(peer = %key, "non-UTF-8 datagram");
                }
            }
        }
    }

    /// Single consumer of the broadcast queue. Feeds the SSE tap, serializes
    /// once, then sends one datagram per registered peer from a registry
    /// snapshot; a failed send evicts that peer.
    pub async fn run_fanout(self: Arc<Self>, mut queue_rx: mpsc::Receiver<Notification>) {
        while let Some(notification) = queue_rx.recv().await {
            let _ = self.sse_tx.send(notification.clone());

            let payload = match serde_json::to_vec(&notification) {
                Ok(bytes) => bytes,
                Err(err) => {
                    error!(error = %err, "failed to serialize notification");
                    continue;
                }
            };

            for (key, addr) in self.registry.snapshot().await {
                if let Err(err) = self.socket.send_to(&payload, addr).await {
                    warn!(peer = %key, error = %err, "send failed, evicting");
                    self.registry.unregister(&key).await;
                }
            }
        }
    }

    /// Heartbeat sweep: evict peers past [`PEER_TIMEOUT`], then `PING` the
    /// rest; a failed ping evicts too.
    pub async fn run_heartbeat(self: Arc<Self>) {
        let mut ticker = interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for key in self.registry.stale(PEER_TIMEOUT).await {
                warn!(peer = %key, "no heartbeat response, evicting");
                self.registry.unregister(&key).await;
            }
            for (key, addr) in self.registry.snapshot().await {
                if let Err(err) = self
                    .socket
                    .send_to(udp_control::PING.as_bytes(), addr)
                    .await
                {
                    warn!(peer = %key, error = %err, "PING send failed, evicting");
                    self.registry.unregister(&key).await;
                }
            }
        }
    }
}
