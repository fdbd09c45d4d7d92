//! HTTP surface of the chat hub.
//!
//! Routes:
//!   GET  /api/v1/ws/chat                       - WebSocket chat handshake
//!   POST /trigger                              - Notification into the fan-in
//!                                                (global-notifications room)
//!   POST /api/v1/rooms/{room_id}/progress      - ProgressUpdate into one room
//!   GET  /health                               - liveness + client/room counts
//!
//! No authentication on the POST routes: they are an internal-network
//! contract between cooperating services. The WS handshake validates its
//! token query parameter.

use crate::hub::{Hub, PublishError};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mh_protocol::{ChatEvent, ErrorBody, HubHealth, Notification, ProgressUpdate, TriggerResponse};
use std::sync::Arc;

#[derive(Clone)]
pub struct GatewayState {
    pub hub: Arc<Hub>,
    pub jwt_secret: Arc<str>,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/ws/chat", get(crate::ws::ws_chat_handler))
        .route("/trigger", post(trigger))
        .route("/api/v1/rooms/{room_id}/progress", post(room_progress))
        .route("/health", get(health))
        .with_state(state)
}

async fn trigger(State(state): State<GatewayState>, body: String) -> Response {
    let notification: Notification = match serde_json::from_str(&body) {
        Ok(notification) => notification,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: format!("invalid JSON: {err}"),
                }),
            )
                .into_response();
        }
    };

    match state.hub.publish_notification(notification) {
        Ok(()) => (
            StatusCode::OK,
            Json(TriggerResponse {
                success: true,
                message: "notification queued".to_owned(),
                clients: state.hub.client_count(),
            }),
        )
            .into_response(),
        Err(err @ (PublishError::QueueFull | PublishError::Closed)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

/// Room-targeted progress cascade: the update becomes a `progress_update`
/// chat event in the room named by the path.
async fn room_progress(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
    body: String,
) -> Response {
    let mut update: ProgressUpdate = match serde_json::from_str(&body) {
        Ok(update) => update,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: format!("invalid JSON: {err}"),
                }),
            )
                .into_response();
        }
    };
    update.stamp();

    let room = state.hub.room(&room_id).await;
    let event = ChatEvent::ProgressUpdate {
        user_id: update.user_id,
        username: update.username,
        room: room_id.clone(),
        manga_id: update.manga_id.unwrap_or(room_id),
        chapter: update.chapter,
        timestamp: update.timestamp,
    };
    match room.try_broadcast(event) {
        Ok(()) => (
            StatusCode::OK,
            Json(TriggerResponse {
                success: true,
                message: "progress update queued".to_owned(),
                clients: state.hub.client_count(),
            }),
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "room broadcast queue full".to_owned(),
            }),
        )
            .into_response(),
    }
}

async fn health(State(state): State<GatewayState>) -> Json<HubHealth> {
    Json(HubHealth {
        status: "healthy".to_owned(),
        chat_clients: state.hub.client_count(),
        rooms: state.hub.room_count().await,
    })
}
