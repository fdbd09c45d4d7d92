//! Hub state: the room map and the notification fan-in.
//!
//! Rooms are created lazily on first use and live for the process lifetime.
//! The hub runs one task consuming the notification fan-in queue and
//! forwarding each entry into the `global-notifications` room's broadcast
//! queue only; every other room sees notifications solely through explicit
//! room-targeted triggers.

use crate::room::{RoomHandle, spawn_room};
use mh_protocol::{ChatEvent, Notification};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

/// System sink room for broadcast notifications.
pub const GLOBAL_ROOM: &str = "global-notifications";
/// Bounded notification fan-in; producers drop (with a warning) when full.
pub const NOTIFY_FANIN_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("notification queue full")]
    QueueFull,
    #[error("notification queue closed")]
    Closed,
}

pub struct Hub {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    notify_tx: mpsc::Sender<Notification>,
    connected: Arc<AtomicUsize>,
}

impl Hub {
    /// Create the hub and hand back the fan-in receiver for
    /// [`run_notification_fanin`].
    ///
    /// [`run_notification_fanin`]: Hub::run_notification_fanin
    pub fn new() -> (Arc<Self>, mpsc::Receiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_FANIN_CAPACITY);
        let hub = Hub {
            rooms: RwLock::new(HashMap::new()),
            notify_tx,
            connected: Arc::new(AtomicUsize::new(0)),
        };
        (Arc::new(hub), notify_rx)
    }

    /// Get the room `id`, creating its dispatcher on first use.
    pub async fn room(&self, id: &str) -> RoomHandle {
        {
            let rooms = self.rooms.read().await;
            if let Some(handle) = rooms.get(id) {
                return handle.clone();
            }
        }
        let mut rooms = self.rooms.write().await;
        if let Some(handle) = rooms.get(id) {
            return handle.clone();
        }
        let handle = spawn_room(id.to_owned(), Arc::clone(&self.connected));
        rooms.insert(id.to_owned(), handle.clone());
        handle
    }

    /// Non-blocking enqueue onto the notification fan-in.
    pub fn publish_notification(&self, notification: Notification) -> Result<(), PublishError> {
        self.notify_tx
            .try_send(notification)
            .map_err(|err| match err {
                TrySendError::Full(_) => PublishError::QueueFull,
                TrySendError::Closed(_) => PublishError::Closed,
            })
    }

    /// Forward each fan-in notification into the global room. A full room
    /// broadcast queue drops the event — the hub never blocks on a room.
    pub async fn run_notification_fanin(
        self: Arc<Self>,
        mut notify_rx: mpsc::Receiver<Notification>,
    ) {
        while let Some(mut notification) = notify_rx.recv().await {
            notification.stamp();
            let room = self.room(GLOBAL_ROOM).await;
            let event = ChatEvent::Notification {
                room: GLOBAL_ROOM.to_owned(),
                message: notification.message,
                timestamp: notification.timestamp,
                manga_id: notification.manga_id,
            };
            if room.try_broadcast(event).is_err() {
                warn!(room = GLOBAL_ROOM, "room queue full, dropping notification");
            }
        }
    }

    /// Live WebSocket clients across all rooms.
    pub fn client_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
