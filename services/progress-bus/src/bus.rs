//! TCP progress bus core.
//!
//! Peers connect over plain TCP and exchange newline-framed UTF-8: either the
//! literal `PING` liveness word or a JSON `ProgressUpdate`. Every accepted
//! update goes through one bounded bus queue consumed by a single fan-out
//! task, so all peers observe the same delivery order.
//!
//! A slow or dead peer never stalls the bus: fan-out writes carry a 5-second
//! deadline and a failed write evicts that peer only.

use mh_protocol::{ProgressUpdate, tcp_control};
use mh_registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

use crate::glue::RoomGlue;

/// Fan-out and control-reply write deadline.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(5);
/// Watchdog sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Peers silent longer than this are evicted by the watchdog.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
/// Bounded bus queue; producers drop (with a warning) when full.
pub const BUS_QUEUE_CAPACITY: usize = 256;
/// SSE tap capacity; lagged subscribers skip missed events.
pub const SSE_TAP_CAPACITY: usize = 256;

/// Writer half of a peer socket, shared between the fan-out task and the
/// peer's own read task (for `PONG` replies). Writes are serialized by the
/// mutex and bounded by [`WRITE_DEADLINE`].
pub type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broadcast queue full")]
    QueueFull,
    #[error("broadcast queue closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("write deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct ProgressBus {
    registry: Registry<SharedWriter>,
    bus_tx: mpsc::Sender<ProgressUpdate>,
    sse_tx: broadcast::Sender<ProgressUpdate>,
    glue: Option<RoomGlue>,
}

impl ProgressBus {
    /// Create the bus and hand back the queue receiver for [`run_fanout`].
    ///
    /// `chat_hub_addr` enables the room-routing glue; `None` disables it.
    ///
    /// [`run_fanout`]: ProgressBus::run_fanout
    pub fn new(chat_hub_addr: Option<String>) -> (Arc<Self>, mpsc::Receiver<ProgressUpdate>) {
        let (bus_tx, bus_rx) = mpsc::channel(BUS_QUEUE_CAPACITY);
        let (sse_tx, _) = broadcast::channel(SSE_TAP_CAPACITY);
        let bus = ProgressBus {
            registry: Registry::new(),
            bus_tx,
            sse_tx,
            glue: chat_hub_addr.map(RoomGlue::new),
        };
        (Arc::new(bus), bus_rx)
    }

    /// Fresh subscription to the SSE tap.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sse_tx.subscribe()
    }

    pub async fn client_count(&self) -> usize {
        self.registry.count().await
    }

    /// Accept an update for broadcast: stamp a zero timestamp, enqueue onto
    /// the bus queue, and kick off the room-glue cascade.
    ///
    /// Keep-alive frames (empty `manga_title`) are accepted and discarded —
    /// they never fan out. A full queue drops the update with an error so
    /// producers stay live.
    pub fn publish(&self, mut update: ProgressUpdate) -> Result<(), PublishError> {
        if update.is_keepalive() {
            debug!(user = %update.user_id, "keep-alive update, not broadcasting");
            return Ok(());
        }
        update.stamp();
        if let Some(glue) = &self.glue {
            glue.forward_progress(&update);
        }
        self.bus_tx.try_send(update).map_err(|err| match err {
            TrySendError::Full(_) => PublishError::QueueFull,
            TrySendError::Closed(_) => PublishError::Closed,
        })
    }

    /// Accept loop. Each peer gets its own read task.
    pub async fn serve_listener(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let bus = Arc::clone(&self);
                    tokio::spawn(async move {
                        bus.handle_connection(stream, addr).await;
                    });
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let key = addr.to_string();
        let (read_half, write_half) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(write_half));
        self.registry.register(&key, Arc::clone(&writer)).await;
        info!(peer = %key, "client connected");

        let mut lines = BufReader::new(read_half).lines();
        let pong_line = format!("{}\n", tcp_control::PONG);
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == tcp_control::PING {
                        self.registry.touch(&key).await;
                        if let Err(err) = write_line(&writer, pong_line.as_bytes()).await {
                            warn!(peer = %key, error = %err, "PONG write failed");
                            break;
                        }
                        continue;
                    }
                    match serde_json::from_str::<ProgressUpdate>(line) {
                        Ok(update) => {
                            self.registry.touch(&key).await;
                            if let Err(err) = self.publish(update) {
                                warn!(peer = %key, error = %err, "dropping progress update");
                            }
                        }
                        Err(err) => {
                            // Malformed frame: log and keep the connection.
                            warn!(peer = %key, error = %err, "unparseable frame");
                        }
                    }
                }
                Ok(None) => {
                    info!(peer = %key, "client disconnected");
                    break;
                }
                Err(err) => {
                    warn!(peer = %key, error = %err, "read error");
                    break;
                }
            }
        }
        if self.registry.unregister(&key).await {
            info!(peer = %key, "client removed");
        }
    }

    /// Single consumer of the bus queue. Serializes each update once, feeds
    /// the SSE tap, then writes to every registered peer from a registry
    /// snapshot. Peers whose write fails or exceeds the deadline are evicted.
    pub async fn run_fanout(self: Arc<Self>, mut bus_rx: mpsc::Receiver<ProgressUpdate>) {
        while let Some(update) = bus_rx.recv().await {
            // Zero-subscriber tap send fails; that is fine.
            let _ = self.sse_tx.send(update.clone());

            let mut line = match serde_json::to_string(&update) {
                Ok(json) => json,
                Err(err) => {
                    error!(error = %err, "failed to serialize progress update");
                    continue;
                }
            };
            line.push('\n');

            for (key, writer) in self.registry.snapshot().await {
                if let Err(err) = write_line(&writer, line.as_bytes()).await {
                    warn!(peer = %key, error = %err, "write failed, evicting");
                    self.evict(&key, &writer).await;
                }
            }
        }
    }

    /// Sweep the registry every [`SWEEP_INTERVAL`] and evict peers whose
    /// last-seen lags more than [`IDLE_TIMEOUT`].
    pub async fn run_watchdog(self: Arc<Self>) {
        let mut sweep = interval(SWEEP_INTERVAL);
        sweep.tick().await;
        loop {
            sweep.tick().await;
            let stale = self.registry.stale(IDLE_TIMEOUT).await;
            if stale.is_empty() {
                continue;
            }
            let peers: std::collections::HashMap<String, SharedWriter> =
                self.registry.snapshot().await.into_iter().collect();
            for key in stale {
                warn!(peer = %key, "no liveness signal, evicting");
                match peers.get(&key) {
                    Some(writer) => self.evict(&key, writer).await,
                    None => {
                        self.registry.unregister(&key).await;
                    }
                }
            }
        }
    }

    async fn evict(&self, key: &str, writer: &SharedWriter) {
        if self.registry.unregister(key).await {
            info!(peer = %key, "client removed");
        }
        // Best-effort close so the peer's read task unblocks promptly.
        let _ = timeout(WRITE_DEADLINE, async {
            let _ = writer.lock().await.shutdown().await;
        })
        .await;
    }
}

async fn write_line(writer: &SharedWriter, bytes: &[u8]) -> Result<(), WriteError> {
    let mut guard = writer.lock().await;
    match timeout(WRITE_DEADLINE, guard.write_all(bytes)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(WriteError::Io(err)),
        Err(_) => Err(WriteError::DeadlineExceeded),
    }
}
