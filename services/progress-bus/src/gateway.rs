//! HTTP trigger gateway for the TCP progress bus.
//!
//! Routes:
//!   POST /trigger              - inject a ProgressUpdate broadcast
//!   GET  /health               - liveness + connected client count
//!   GET  /api/v1/sse/progress  - SSE bridge of the fan-out stream
//!
//! No authentication on /trigger: the gateway is an internal-network
//! contract between cooperating services. The SSE route validates the
//! token query parameter at handshake.

use crate::bus::{ProgressBus, PublishError};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mh_protocol::{ErrorBody, ProgressUpdate, TcpHealth, TriggerResponse};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct GatewayState {
    pub bus: Arc<ProgressBus>,
    pub jwt_secret: Arc<str>,
    pub sse_keepalive: Duration,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/trigger", post(trigger))
        .route("/health", get(health))
        .route("/api/v1/sse/progress", get(crate::sse::progress_sse))
        .with_state(state)
}

async fn trigger(State(state): State<GatewayState>, body: String) -> Response {
    let update: ProgressUpdate = match serde_json::from_str(&body) {
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

    match state.bus.publish(update) {
        Ok(()) => {
            let clients = state.bus.client_count().await;
            (
                StatusCode::OK,
                Json(TriggerResponse {
                    success: true,
                    message: "progress update queued".to_owned(),
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

async fn health(State(state): State<GatewayState>) -> Json<TcpHealth> {
    Json(TcpHealth {
        status: "healthy".to_owned(),
        connected_clients: state.bus.client_count().await,
    })
}
