//! Chat tree and paginated-turn retrieval.
//!
//! Grounded on `api/runs.rs`'s `ListRunsQuery` (query-param struct with
//! defaults) and `parse_status` (string-to-enum helper); the underlying
//! data here is the store's chat/turn forest instead of a flat run list.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dw_domain::block::TurnBlock;
use dw_domain::turn::Turn;
use dw_store::{Direction, PaginatedTurns, TurnWithBlocks};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn get_chat_tree(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> impl IntoResponse {
    if !state.config.engine.chat_tree_endpoint_enabled {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    }
    match state.store.get_chat_tree(chat_id) {
        Ok(nodes) => Json(nodes).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct PaginatedTurnsQuery {
    #[serde(default)]
    pub from_turn_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub direction: Option<String>,
}

fn default_limit() -> usize {
    25
}

fn parse_direction(s: Option<&str>) -> Direction {
    match s {
        Some("before") => Direction::Before,
        Some("after") => Direction::After,
        _ => Direction::Both,
    }
}

#[derive(Debug, Serialize)]
pub struct TurnWithBlocksWire {
    pub turn: Turn,
    pub blocks: Vec<TurnBlock>,
    pub sibling_ids: Vec<Uuid>,
}

impl From<TurnWithBlocks> for TurnWithBlocksWire {
    fn from(t: TurnWithBlocks) -> Self {
        Self {
            turn: t.turn,
            blocks: t.blocks,
            sibling_ids: t.sibling_ids,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedTurnsWire {
    pub turns: Vec<TurnWithBlocksWire>,
    pub has_more_before: bool,
    pub has_more_after: bool,
}

impl From<PaginatedTurns> for PaginatedTurnsWire {
    fn from(p: PaginatedTurns) -> Self {
        Self {
            turns: p.turns.into_iter().map(Into::into).collect(),
            has_more_before: p.has_more_before,
            has_more_after: p.has_more_after,
        }
    }
}

pub async fn get_paginated_turns(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(q): Query<PaginatedTurnsQuery>,
) -> ApiResult<Json<PaginatedTurnsWire>> {
    let direction = parse_direction(q.direction.as_deref());
    let limit = q.limit.min(200);
    let page = state
        .store
        .get_paginated_turns(chat_id, q.from_turn_id, limit, direction)?;
    Ok(Json(page.into()))
}
