//! HTTP trigger gateway for the UDP notification bus.
//!
//! Routes:
//!   POST /trigger                   - inject a Notification broadcast
//!   GET  /health                    - liveness + registered client count
//!   GET  /api/v1/sse/notifications  - SSE bridge of the broadcast stream
//!
//! No authentication on /trigger: the gateway is an internal-network
//! contract between cooperating services.

use crate::bus::{NotifyBus, PublishError};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mh_protocol::{ErrorBody, Notification, TriggerResponse, UdpHealth};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct GatewayState {
    pub bus: Arc<NotifyBus>,
    pub jwt_secret: Arc<str>,
    pub sse_keepalive: Duration,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/trigger", post(trigger))
        .route("/health", get(health))
        .route("/api/v1/sse/notifications", get(crate::sse::notifications_sse))
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

    match state.bus.publish(notification) {
        Ok(()) => {
            let clients = state.bus.client_count().await;
            (
                StatusCode::OK,
                Json(TriggerResponse {
                    success: true,
                    message: "notification queued".to_owned(),
                    clients,
                }),
            )
                .into_response()
        }
        Err(err @ (PublishError::QueueFull | PublishError::Closed)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn health(State(state): State<GatewayState>) -> Json<UdpHealth> {
    Json(UdpHealth {
        status: "healthy".to_owned(),
        udp_clients: state.bus.client_count().await,
    })
}
