//! `GET /healthz` — ambient liveness probe, standard gateway convention
//! regardless of what the distilled spec scopes out.

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "providers": state.providers.len(),
        "active_turns": state.hubs.len(),
    }))
}
