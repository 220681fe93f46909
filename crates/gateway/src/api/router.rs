//! Route table. Grounded on the teacher's `api::router(state)` entry point
//! — one `Router` built from nested method handlers, auth middleware
//! layered over the whole `/api` surface, `/healthz` left unauthenticated.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use super::{auth, chats, health, stream, turns};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/chats/:chat_id/turns",
            post(turns::create_turn).get(chats::get_paginated_turns),
        )
        .route("/turns/:turn_id/interrupt", post(turns::interrupt_turn))
        .route("/turns/:turn_id/blocks", get(turns::get_blocks))
        .route("/turns/:turn_id/stream", get(stream::turn_stream))
        .route("/chats/:chat_id/tree", get(chats::get_chat_tree))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_token,
        ));

    Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/api", api)
        .with_state(state)
}
