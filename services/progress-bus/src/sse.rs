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

/// `GET /api/v1/sse/progress?token=<jwt>` — one-way bridge of the bus
/// fan-out to browser clients. Liveness `PING`/`PONG` traffic never reaches
/// the tap, so subscribers only ever see broadcast payloads.
pub async fn progress_sse(
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
    let updates = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(update) => match serde_json::to_string(&update) {
            Ok(json) => Some(Ok::<_, Infallible>(Event::default().event("message").data(json))),
            Err(_) => None,
        },
        // Lagged subscriber: skip missed events and continue.
        Err(_) => None,
    });
    let initial = tokio_stream::once(Ok(Event::default().event("connected").data("{}")));
    let stream = initial.chain(updates);

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(state.sse_keepalive)
                .event(Event::default().event("ping").data("{}")),
        )
        .into_response()
}
