//! `GET /api/turns/{turn_id}/stream` — SSE stream of a turn's events.
//!
//! Grounded on the teacher's `run_events_sse`/`make_run_event_stream`
//! (`api/runs.rs`): check existence, snapshot-and-close if already
//! terminal, otherwise subscribe to the live channel and forward with
//! `Lagged`/`Closed` handling. Generalized with the catch-up protocol
//! (`dw_engine::catchup`) so a reconnecting client replays persisted
//! blocks plus the live-buffer tail instead of only the latest snapshot.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::Stream;
use uuid::Uuid;

use dw_engine::{build_plan, Envelope, TurnEvent};

use crate::error::ApiError;
use crate::state::AppState;

fn to_sse_event(event: &TurnEvent) -> Event {
    let data = serde_json::to_value(event)
        .ok()
        .and_then(|v| v.get("data").cloned())
        .unwrap_or(serde_json::Value::Null);
    Event::default()
        .event(event.name())
        .data(serde_json::to_string(&data).unwrap_or_default())
}

fn last_event_id(headers: &HeaderMap) -> u64 {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

pub async fn turn_stream(
    State(state): State<AppState>,
    Path(turn_id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let turn = match state.store.get_turn(turn_id) {
        Ok(t) => t,
        Err(e) => return ApiError(e).into_response(),
    };

    let hub = state.hubs.get(turn_id);
    let since = last_event_id(&headers);
    let persisted_terminal = if hub.is_none() {
        state.store.get_blocks(turn_id).unwrap_or_default()
    } else {
        Vec::new()
    };

    let plan = build_plan(
        &turn,
        hub,
        since,
        || state.store.get_blocks(turn_id).unwrap_or_default(),
        persisted_terminal,
    );

    let plan = match plan {
        Ok(p) => p,
        Err(_) => {
            return ApiError(dw_domain::error::Error::NotFound(format!(
                "no live or persisted trace for turn {turn_id}"
            )))
            .into_response()
        }
    };

    let replay: Vec<Event> = plan.replay.iter().map(to_sse_event).collect();

    let stream = build_stream(replay, plan.live);
    let mut response = Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response();
    response
        .headers_mut()
        .insert("cache-control", HeaderValue::from_static("no-cache"));
    response
        .headers_mut()
        .insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

fn build_stream(
    replay: Vec<Event>,
    live: Option<tokio::sync::broadcast::Receiver<Envelope>>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        for event in replay {
            yield Ok(event);
        }

        let Some(mut rx) = live else { return };
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    yield Ok(to_sse_event(&envelope.event));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("warning")
                        .data(format!("{{\"warning\":\"missed {n} events\"}}")));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
