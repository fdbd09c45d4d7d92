// mh-protocol: MangaHub fabric wire types and serialization.
//
// Three message shapes travel the buses: `ProgressUpdate` (TCP + SSE),
// `Notification` (UDP + SSE + hub fan-in) and `ChatEvent` (WebSocket rooms).
// Chat frames use a top-level `type` field for discriminated
// deserialization; the variants map 1:1 to the room message kinds.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current unix time in whole seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// ProgressUpdate (TCP Progress Bus)
// ---------------------------------------------------------------------------

/// What a reader is currently doing.
///
/// In-flight only; the fabric never persists these. A zero `timestamp` is
/// stamped with the current unix time when the bus enqueues the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub user_id: String,
    pub username: String,
    /// Display title. An empty title marks the frame as a liveness
    /// keep-alive: it refreshes the peer's last-seen and is never fanned out.
    pub manga_title: String,
    pub chapter: u32,
    #[serde(default)]
    pub timestamp: i64,
    /// Optional catalog id. When present, the glue also routes the update
    /// into the chat room whose id equals this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manga_id: Option<String>,
}

impl ProgressUpdate {
    /// True when the frame only refreshes liveness and must not be broadcast.
    pub fn is_keepalive(&self) -> bool {
        self.manga_title.is_empty()
    }

    /// Stamp a zero timestamp with the current unix time.
    pub fn stamp(&mut self) {
        if self.timestamp == 0 {
            self.timestamp = now_unix();
        }
    }
}

// ---------------------------------------------------------------------------
// Notification (UDP Notification Bus)
// ---------------------------------------------------------------------------

/// Known notification kinds.
///
/// The wire field is an open enum: unknown kinds are broadcast verbatim, so
/// `Notification::kind` stays a plain `String` and these constants name the
/// values the fabric itself produces.
pub mod kinds {
    pub const CHAPTER_RELEASE: &str = "chapter_release";
    pub const MANGA_UPDATE: &str = "manga_update";
    pub const NEW_COMICS: &str = "new_comics";
    pub const NEW_CHAPTERS: &str = "new_chapters";
    pub const SYNC_COMPLETE: &str = "sync_complete";
    pub const PROGRESS_UPDATE: &str = "progress_update";
    pub const NOTIFICATION: &str = "notification";
}

/// System-emitted event carried as one UDP datagram (and mirrored to SSE and
/// the hub's global-notifications room).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// One of [`kinds`], or any other string — unknown kinds pass through.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub manga_id: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl Notification {
    pub fn new(kind: &str, manga_id: &str, message: String) -> Self {
        Notification {
            kind: kind.to_owned(),
            manga_id: manga_id.to_owned(),
            message,
            timestamp: now_unix(),
        }
    }

    /// Stamp a zero timestamp with the current unix time.
    pub fn stamp(&mut self) {
        if self.timestamp == 0 {
            self.timestamp = now_unix();
        }
    }
}

// ---------------------------------------------------------------------------
// ChatEvent (WebSocket Room Hub)
// ---------------------------------------------------------------------------

/// Chat message length bounds in bytes, inclusive.
pub const CHAT_MESSAGE_MIN: usize = 1;
pub const CHAT_MESSAGE_MAX: usize = 1000;

/// All room message kinds, discriminated by the `type` field.
///
/// ```json
/// { "type": "message", "user_id": "u1", ... }
/// ```
///
/// Only `Message` entries enter a room's history; every other kind is
/// transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ChatEvent {
    Message {
        user_id: String,
        username: String,
        message: String,
        timestamp: i64,
        room: String,
    },
    Join {
        user_id: String,
        username: String,
        message: String,
        timestamp: i64,
        room: String,
    },
    Leave {
        user_id: String,
        username: String,
        message: String,
        timestamp: i64,
        room: String,
    },
    UserList {
        room: String,
        users: Vec<String>,
        timestamp: i64,
    },
    Notification {
        room: String,
        message: String,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        manga_id: String,
    },
    ProgressUpdate {
        user_id: String,
        username: String,
        room: String,
        manga_id: String,
        chapter: u32,
        timestamp: i64,
    },
}

impl ChatEvent {
    /// True for the one kind that is appended to room history.
    pub fn is_history(&self) -> bool {
        matches!(self, ChatEvent::Message { .. })
    }
}

/// The only client→server chat frame. Any other field in the incoming JSON
/// is ignored; the session stamps identity, room and timestamp itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundChat {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Control words
// ---------------------------------------------------------------------------

/// Newline-framed TCP liveness words.
pub mod tcp_control {
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";
}

/// Single-datagram UDP control words (ASCII, no framing).
pub mod udp_control {
    pub const REGISTER: &str = "REGISTER";
    pub const UNREGISTER: &str = "UNREGISTER";
    pub const REGISTERED: &str = "REGISTERED";
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";
}

// ---------------------------------------------------------------------------
// HTTP gateway envelopes
// ---------------------------------------------------------------------------

/// Response body for `POST /trigger` on every bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    /// Live client count at the moment the trigger was accepted.
    pub clients: usize,
}

/// `GET /health` on the TCP progress bus gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpHealth {
    pub status: String,
    pub connected_clients: usize,
}

/// `GET /health` on the UDP notification bus gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpHealth {
    pub status: String,
    pub udp_clients: usize,
}

/// `GET /health` on the chat hub gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubHealth {
    pub status: String,
    pub chat_clients: usize,
    pub rooms: usize,
}

/// Frozen error envelope used by all non-2xx gateway responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// JWT payload carried in the `token` query parameter of SSE and WS
/// handshakes. Validated once at handshake time, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    /// Expiry, unix seconds.
    pub exp: usize,
}
