//! The SSE event vocabulary the turn executor publishes and the stream hub
//! fans out. Gateway handlers are responsible for the wire `event: <type>\n
//! data: <json>\n\n` framing; this module only defines the payloads.

use dw_domain::block::{BlockType, TurnBlock};
use dw_domain::stream::DeltaType;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum TurnEvent {
    TurnStart {
        turn_id: Uuid,
        model: Option<String>,
    },
    BlockStart {
        block_index: u32,
        block_type: Option<BlockType>,
    },
    BlockDelta {
        block_index: u32,
        delta_type: DeltaType,
        #[serde(skip_serializing_if = "Option::is_none")]
        text_delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        json_delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature_delta: Option<String>,
    },
    BlockStop {
        block_index: u32,
    },
    BlockCatchup {
        block: TurnBlock,
    },
    TurnComplete {
        turn_id: Uuid,
        stop_reason: String,
        input_tokens: u32,
        output_tokens: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_metadata: Option<serde_json::Value>,
    },
    TurnError {
        turn_id: Uuid,
        error: String,
        is_cancelled: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_block_index: Option<u32>,
    },
}

impl TurnEvent {
    /// The SSE `event:` field name.
    pub fn name(&self) -> &'static str {
        match self {
            TurnEvent::TurnStart { .. } => "turn_start",
            TurnEvent::BlockStart { .. } => "block_start",
            TurnEvent::BlockDelta { .. } => "block_delta",
            TurnEvent::BlockStop { .. } => "block_stop",
            TurnEvent::BlockCatchup { .. } => "block_catchup",
            TurnEvent::TurnComplete { .. } => "turn_complete",
            TurnEvent::TurnError { .. } => "turn_error",
        }
    }

    /// Whether this event belongs to the given block index's run, for
    /// buffer-clearing once that block has been persisted.
    pub fn belongs_to_block(&self, index: u32) -> bool {
        matches!(
            self,
            TurnEvent::BlockStart { block_index, .. }
                | TurnEvent::BlockDelta { block_index, .. }
                | TurnEvent::BlockStop { block_index, .. }
            if *block_index == index
        )
    }
}
