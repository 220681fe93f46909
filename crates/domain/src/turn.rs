use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A turn's place in its lifecycle. See module docs on [`Turn`] for the
/// legal transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Streaming,
    WaitingTools,
    Complete,
    Cancelled,
    Error,
}

impl TurnStatus {
    /// Terminal turns are safe to paginate through or replay without
    /// locking the executor — their blocks are the final word.
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnStatus::Complete | TurnStatus::Cancelled | TurnStatus::Error)
    }
}

/// Generation parameters accepted on turn creation and forwarded (merged
/// with server-side defaults) into the provider request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub thinking_enabled: bool,
    #[serde(default)]
    pub thinking_level: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

/// One node in a chat's turn forest.
///
/// `prev_turn_id` is the only structural pointer the store keeps; ancestor
/// paths, sibling sets, and the chat tree are all reconstructed by querying
/// on this field rather than materializing a pointer graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub prev_turn_id: Option<Uuid>,
    pub role: TurnRole,
    pub status: TurnStatus,
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub request_params: Option<RequestParams>,
    #[serde(default)]
    pub response_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new_user(chat_id: Uuid, prev_turn_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            chat_id,
            prev_turn_id,
            role: TurnRole::User,
            status: TurnStatus::Complete,
            model: None,
            input_tokens: None,
            output_tokens: None,
            stop_reason: None,
            request_params: None,
            response_metadata: None,
            created_at: now,
            completed_at: Some(now),
        }
    }

    pub fn new_assistant_pending(chat_id: Uuid, prev_turn_id: Option<Uuid>, model: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            prev_turn_id,
            role: TurnRole::Assistant,
            status: TurnStatus::Pending,
            model,
            input_tokens: None,
            output_tokens: None,
            stop_reason: None,
            request_params: None,
            response_metadata: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Partial update accepted by `UpdateTurnMetadata`. Every field is optional
/// so callers can patch only what changed on a given lifecycle transition.
#[derive(Debug, Clone, Default)]
pub struct TurnMetadataUpdate {
    pub status: Option<TurnStatus>,
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub stop_reason: Option<String>,
    pub response_metadata: Option<serde_json::Value>,
    pub mark_completed: bool,
}
