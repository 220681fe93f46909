use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::block::{BlockType, ExecutionSide, TurnBlock};
use crate::error::ProviderErrorCategory;

/// A boxed async stream, used for provider streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaType {
    Text,
    Thinking,
    JsonInput,
    Signature,
}

/// Metadata carried on the first delta for a block index, once the
/// provider has announced the block's type. Absent on subsequent deltas
/// for the same index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStartMeta {
    pub block_type: BlockType,
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub execution_side: Option<ExecutionSide>,
    #[serde(default)]
    pub provider_data: Option<serde_json::Value>,
}

impl Default for BlockType {
    fn default() -> Self {
        BlockType::Text
    }
}

/// Final per-turn metadata reported once the provider closes the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub stop_reason: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub response_metadata: Option<serde_json::Value>,
    pub model: String,
}

/// The provider-agnostic event vocabulary every `LlmProvider` adapter must
/// translate its wire format into. This is the sole contract the block
/// accumulator and turn executor depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "block_delta")]
    BlockDelta {
        block_index: u32,
        delta_type: DeltaType,
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<BlockStartMeta>,
    },
    #[serde(rename = "block")]
    Block { block_index: u32, block: TurnBlock },
    #[serde(rename = "metadata")]
    Metadata(StreamMetadata),
    #[serde(rename = "error")]
    Error {
        category: ProviderErrorCategory,
        message: String,
    },
}
