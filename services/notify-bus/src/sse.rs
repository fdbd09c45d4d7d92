use crate::gateway::GatewayState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
};
use mh_protocol::ErrorBody;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

#[derive(Debug, Deserialize)]
pub struct SseParams {
    #[serde(default)]
    token: Option<String>,
}

/// `GET /api/v1/sse/notifications?token=<jwt>` — one-way bridge of the
/// datagram broadcast stream to browser clients.
pub async fn notifications_sse(
    State(state): State<GatewayState>,
    Query(params): Query<SseParams>,
) -> Response {
    let authorized = params
        .token
        .as_deref()
        .and_then(|token| mh_auth::verify_token(token, &state.jwt_secret));
    if authorized.is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "invalid or missing token".to_owned(),
            }),
        )
            .into_response();
    }

    let rx = state.bus.subscribe();
    let notifications = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(notification) => match serde_json::to_string(&notification) {
            Ok(json) => Some(Ok::<_, Infallible>(Event::default().event("message").data(json))),
            Err(_) => None,
        },
        // Lagged subscriber: skip missed events and continue.
        Err(_) => None,
    });
    let initial = tokio_stream::once(Ok(Event::default().event("connected").data("{}")));
    let stream = initial.chain(notifications);

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(state.sse_keepalive)
                .event(Event::default().event("ping").data("{}")),
        )
        .into_response()
}
