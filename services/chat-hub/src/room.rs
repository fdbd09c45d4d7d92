//! Room dispatcher.
//!
//! Each room runs a single dispatcher task owning its member map and bounded
//! history, fed by two queues: a control queue (register/unregister, never
//! dropped) and a bounded broadcast queue (non-blocking producers, drop on
//! full). Members receive serialized frames through their own bounded
//! outbound queue; a member whose queue rejects a frame is scheduled for
//! unregister, so one dead client never stalls the room.

use mh_protocol::{ChatEvent, now_unix};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Room history keeps at most this many `message` entries, FIFO.
pub const HISTORY_MAX: usize = 1000;
/// Broadcast queue bound; producers drop (with a warning) when full.
pub const BROADCAST_QUEUE_CAPACITY: usize = 256;
/// Per-member outbound queue. Sized so a full history replay plus the join
/// burst fits without evicting a fresh member.
pub const OUTBOUND_QUEUE_CAPACITY: usize = HISTORY_MAX + 64;
/// Control queue bound; register/unregister use awaited sends.
const CONTROL_QUEUE_CAPACITY: usize = 64;

/// A connected client as the dispatcher sees it.
#[derive(Debug, Clone)]
pub struct Member {
    pub conn_id: Uuid,
    pub user_id: String,
    pub username: String,
    /// Serialized frames; the session task forwards them to the socket
    /// under the write deadline.
    pub outbound: mpsc::Sender<String>,
}

enum RoomControl {
    Register(Member),
    Unregister(Uuid),
}

/// Cheap handle to a running room dispatcher.
#[derive(Clone)]
pub struct RoomHandle {
    id: String,
    broadcast_tx: mpsc::Sender<ChatEvent>,
    control_tx: mpsc::Sender<RoomControl>,
}

impl RoomHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn register(&self, member: Member) {
        if self
            .control_tx
            .send(RoomControl::Register(member))
            .await
            .is_err()
        {
            warn!(room = %self.id, "room dispatcher gone, register dropped");
        }
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        if self
            .control_tx
            .send(RoomControl::Unregister(conn_id))
            .await
            .is_err()
        {
            warn!(room = %self.id, "room dispatcher gone, unregister dropped");
        }
    }

    /// Non-blocking enqueue onto the room broadcast queue. A full queue is a
    /// backpressure drop, reported to the caller for logging.
    pub fn try_broadcast(&self, event: ChatEvent) -> Result<(), TrySendError<ChatEvent>> {
        self.broadcast_tx.try_send(event)
    }
}

/// Spawn the dispatcher task for room `id`. Rooms are never destroyed while
/// the process runs; an empty room is retained.
pub fn spawn_room(id: String, connected: Arc<AtomicUsize>) -> RoomHandle {
    let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAPACITY);
    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
    let handle = RoomHandle {
        id: id.clone(),
        broadcast_tx,
        control_tx,
    };
    tokio::spawn(dispatch(id, broadcast_rx, control_rx, connected));
    handle
}

struct RoomState {
    id: String,
    members: HashMap<Uuid, Member>,
    history: VecDeque<ChatEvent>,
    connected: Arc<AtomicUsize>,
}

async fn dispatch(
    id: String,
    mut broadcast_rx: mpsc::Receiver<ChatEvent>,
    mut control_rx: mpsc::Receiver<RoomControl>,
    connected: Arc<AtomicUsize>,
) {
    let mut room = RoomState {
        id,
        members: HashMap::new(),
        history: VecDeque::new(),
        connected,
    };
    loop {
        tokio::select! {
            control = control_rx.recv() => match control {
                Some(RoomControl::Register(member)) => room.handle_register(member),
                Some(RoomControl::Unregister(conn_id)) => room.handle_unregister(conn_id),
                None => break,
            },
            event = broadcast_rx.recv() => match event {
                Some(event) => room.handle_broadcast(event),
                None => break,
            },
        }
    }
}

impl RoomState {
    fn handle_register(&mut self, member: Member) {
        let conn_id = member.conn_id;
        let username = member.username.clone();
        let replay_to = member.outbound.clone();
        if self.members.insert(conn_id, member).is_none() {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        info!(room = %self.id, conn = %conn_id, user = %username, "member joined");

        self.handle_broadcast(ChatEvent::Join {
            user_id: self.members[&conn_id].user_id.clone(),
            username: username.clone(),
            message: format!("{username} joined the room"),
            timestamp: now_unix(),
            room: self.id.clone(),
        });

        // History replay goes to the new member alone, in order.
        let mut replay_failed = false;
        for entry in &self.history {
            let Ok(json) = serde_json::to_string(entry) else {
                continue;
            };
            if replay_to.try_send(json).is_err() {
                replay_failed = true;
                break;
            }
        }
        if replay_failed {
            warn!(room = %self.id, conn = %conn_id, "history replay failed, evicting");
            self.handle_unregister(conn_id);
            return;
        }

        self.broadcast_user_list();
    }

    fn handle_unregister(&mut self, conn_id: Uuid) {
        let Some(member) = self.members.remove(&conn_id) else {
            return;
        };
        self.connected.fetch_sub(1, Ordering::SeqCst);
        info!(room = %self.id, conn = %conn_id, user = %member.username, "member left");

        self.handle_broadcast(ChatEvent::Leave {
            user_id: member.user_id,
            username: member.username.clone(),
            message: format!("{} left the room", member.username),
            timestamp: now_unix(),
            room: self.id.clone(),
        });
        self.broadcast_user_list();
    }

    /// Serialize once, deliver to a member snapshot, then append `message`
    /// events to the bounded history. Members whose outbound queue rejects
    /// the frame are unregistered afterwards (which emits leave/user_list
    /// events of its own).
    fn handle_broadcast(&mut self, event: ChatEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                warn!(room = %self.id, error = %err, "failed to serialize event");
                return;
            }
        };

        let mut failed: Vec<Uuid> = Vec::new();
        for member in self.members.values() {
            if member.outbound.try_send(json.clone()).is_err() {
                failed.push(member.conn_id);
            }
        }

        if event.is_history() {
            self.history.push_back(event);
            while self.history.len() > HISTORY_MAX {
                self.history.pop_front();
            }
        }

        for conn_id in failed {
            debug!(room = %self.id, conn = %conn_id, "outbound queue rejected frame, evicting");
            self.handle_unregister(conn_id);
        }
    }

    fn broadcast_user_list(&mut self) {
        let mut users: Vec<String> = self
            .members
            .values()
            .map(|member| member.username.clone())
            .collect();
        users.sort();
        self.handle_broadcast(ChatEvent::UserList {
            room: self.id.clone(),
            users,
            timestamp: now_unix(),
        });
    }
}
