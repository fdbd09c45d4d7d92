//! WebSocket chat sessions.
//!
//! `GET /api/v1/ws/chat?room=<id>&token=<jwt>`: the token is validated at
//! handshake (browsers cannot set headers here), then the session joins its
//! room and runs one select loop:
//! - outbound frames from the room dispatcher, written under a 10-second
//!   deadline;
//! - inbound frames under a 120-second pong-wait that any received frame
//!   (pongs included) resets;
//! - a ping ticker at 90% of the pong wait.
//!
//! Inbound text frames carry only a `message` body; the session stamps
//! identity, room and timestamp, validates the 1..=1000-byte bound, and
//! non-blockingly enqueues to the room. Invalid frames are dropped and
//! logged; a full room queue drops the message and the session stays up.

use crate::gateway::GatewayState;
use crate::hub::Hub;
use crate::room::{Member, OUTBOUND_QUEUE_CAPACITY};
use axum::{
    Json,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mh_protocol::{
    CHAT_MESSAGE_MAX, CHAT_MESSAGE_MIN, ChatEvent, Claims, ErrorBody, InboundChat, now_unix,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{info, warn};
use uuid::Uuid;

/// Read deadline; refreshed by every received frame, pongs included.
pub const PONG_WAIT: Duration = Duration::from_secs(120);
/// Ping cadence: 90% of the pong wait.
pub const PING_INTERVAL: Duration = Duration::from_secs(108);
/// Socket write deadline.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    room: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(params): Query<WsParams>,
) -> Response {
    let Some(claims) = params
        .token
        .as_deref()
        .and_then(|token| mh_auth::verify_token(token, &state.jwt_secret))
    else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "invalid or missing token".to_owned(),
            }),
        )
            .into_response();
    };
    let Some(room_id) = params.room.filter(|room| !room.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "room query parameter is required".to_owned(),
            }),
        )
            .into_response();
    };

    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_chat_socket(socket, hub, room_id, claims))
}

async fn handle_chat_socket(mut socket: WebSocket, hub: Arc<Hub>, room_id: String, claims: Claims) {
    let conn_id = Uuid::new_v4();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
    let room = hub.room(&room_id).await;
    room.register(Member {
        conn_id,
        user_id: claims.sub.clone(),
        username: claims.username.clone(),
        outbound: outbound_tx,
    })
    .await;
    info!(room = %room_id, conn = %conn_id, user = %claims.username, "chat session started");

    let mut ping = interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(json) => {
                        match timeout(WRITE_DEADLINE, socket.send(Message::Text(json.into()))).await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => { warn!(conn = %conn_id, error = %err, "write failed"); break; }
                            Err(_) => { warn!(conn = %conn_id, "write deadline exceeded"); break; }
                        }
                    }
                    // The dispatcher evicted us.
                    None => break,
                }
            }
            incoming = timeout(PONG_WAIT, socket.recv()) => {
                match incoming {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        handle_inbound(&room, &claims, &room_id, text.as_str());
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Ok(Some(Ok(Message::Pong(_)))) => {
                        // Pong wait resets by looping.
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                        info!(conn = %conn_id, "chat client disconnected");
                        break;
                    }
                    Ok(Some(Err(err))) => {
                        warn!(conn = %conn_id, error = %err, "WS error");
                        break;
                    }
                    Ok(Some(Ok(_))) => {}
                    Err(_) => {
                        warn!(conn = %conn_id, "pong wait expired");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                match timeout(WRITE_DEADLINE, socket.send(Message::Ping(Vec::new().into()))).await {
                    Ok(Ok(())) => {}
                    _ => { warn!(conn = %conn_id, "ping failed"); break; }
                }
            }
        }
    }

    room.unregister(conn_id).await;
    info!(room = %room_id, conn = %conn_id, "chat session ended");
}

fn handle_inbound(
    room: &crate::room::RoomHandle,
    claims: &Claims,
    room_id: &str,
    text: &str,
) {
    let frame: InboundChat = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(room = %room_id, error = %err, "unparseable chat frame, dropping");
            return;
        }
    };
    let len = frame.message.len();
    if !(CHAT_MESSAGE_MIN..=CHAT_MESSAGE_MAX).contains(&len) {
        warn!(room = %room_id, len, "chat message length out of bounds, dropping");
        return;
    }
    let event = ChatEvent::Message {
        user_id: claims.sub.clone(),
        username: claims.username.clone(),
        message: frame.message,
        timestamp: now_unix(),
        room: room_id.to_owned(),
    };
    if room.try_broadcast(event).is_err() {
        warn!(room = %room_id, "room queue full, dropping chat message");
    }
}
