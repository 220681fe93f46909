//! Turn creation, interruption, and block retrieval.
//!
//! Grounded on the teacher's `api/runs.rs` request/response shapes
//! (`get_run`/`get_run_nodes`), generalized to this system's user-turn +
//! pending-assistant-turn pair instead of a single `Run` record.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dw_domain::block::{BlockContent, BlockType, ExecutionSide, TurnBlock};
use dw_domain::error::Error;
use dw_domain::turn::{RequestParams, Turn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Wire shape for a block in a create-turn request body — no `turn_id` or
/// `sequence`, since the store assigns both.
#[derive(Debug, Deserialize)]
pub struct BlockInput {
    pub block_type: BlockType,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub content: BlockContent,
    #[serde(default)]
    pub provider_data: Option<serde_json::Value>,
    #[serde(default)]
    pub execution_side: Option<ExecutionSide>,
}

impl From<BlockInput> for TurnBlock {
    fn from(b: BlockInput) -> Self {
        TurnBlock {
            turn_id: Uuid::nil(),
            sequence: 0,
            block_type: b.block_type,
            text_content: b.text_content,
            content: b.content,
            provider_data: b.provider_data,
            execution_side: b.execution_side,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTurnRequest {
    #[serde(default)]
    pub prev_turn_id: Option<Uuid>,
    #[serde(default)]
    pub blocks: Vec<BlockInput>,
    #[serde(default)]
    pub request_params: Option<RequestParams>,
    /// Which configured provider (registry id) should drive the assistant
    /// turn. Defaults to the first provider the registry successfully
    /// initialized — there is no per-request concept of a "default
    /// provider" upstream of the gateway, so the choice is made here.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateTurnResponse {
    pub user_turn: Turn,
    pub assistant_turn: Turn,
    pub stream_url: String,
}

pub async fn create_turn(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<CreateTurnRequest>,
) -> ApiResult<Json<CreateTurnResponse>> {
    let provider_id = req
        .provider
        .or_else(|| state.providers.list_providers().into_iter().next())
        .ok_or_else(|| Error::Config("no LLM providers configured".into()))?;
    if state.providers.get(&provider_id).is_none() {
        return Err(ApiError(Error::NotFound(format!("provider '{provider_id}'"))));
    }

    // Serialize turn creation per chat: two concurrent requests against the
    // same chat must not race on `prev_turn_id`/sibling ordering.
    let _chat_permit = state.chat_locks.acquire(chat_id).await;

    let user_turn = Turn::new_user(chat_id, req.prev_turn_id);
    let user_turn = state.store.create_turn(user_turn)?;

    if !req.blocks.is_empty() {
        let blocks: Vec<TurnBlock> = req.blocks.into_iter().map(Into::into).collect();
        state.store.create_blocks(user_turn.id, blocks)?;
    }

    let mut assistant_turn = Turn::new_assistant_pending(chat_id, Some(user_turn.id), Some(provider_id));
    assistant_turn.request_params = req.request_params;
    let assistant_turn = state.store.create_turn(assistant_turn)?;

    state.executor.spawn(assistant_turn.id, req.system_prompt);

    let stream_url = format!("/api/turns/{}/stream", assistant_turn.id);
    Ok(Json(CreateTurnResponse {
        user_turn,
        assistant_turn,
        stream_url,
    }))
}

pub async fn interrupt_turn(
    State(state): State<AppState>,
    Path(turn_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let turn = state.store.get_turn(turn_id)?;
    if turn.is_terminal() {
        return Ok(Json(serde_json::json!({ "cancelled": false, "reason": "turn already terminal" })));
    }
    let cancelled = state.cancels.cancel(turn_id);
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

pub async fn get_blocks(
    State(state): State<AppState>,
    Path(turn_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TurnBlock>>> {
    let blocks = state.store.get_blocks(turn_id)?;
    Ok(Json(blocks))
}
