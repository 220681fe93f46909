use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::turn::TurnRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    Image,
    Reference,
    PartialReference,
    WebSearchUse,
    WebSearchResult,
}

impl BlockType {
    /// User turns may only carry these types; violations are rejected at
    /// `CreateBlocks` time.
    pub fn user_eligible(self) -> bool {
        matches!(
            self,
            BlockType::Text
                | BlockType::Image
                | BlockType::Reference
                | BlockType::PartialReference
                | BlockType::ToolResult
        )
    }

    /// Assistant turns may only carry these types.
    pub fn assistant_eligible(self) -> bool {
        !matches!(self, BlockType::Image | BlockType::PartialReference)
    }

    pub fn eligible_for(self, role: TurnRole) -> bool {
        match role {
            TurnRole::User => self.user_eligible(),
            TurnRole::Assistant => self.assistant_eligible(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSide {
    Server,
    Client,
}

/// Type-specific structured fields for a block. Stored as a JSON object on
/// disk; validated against this tagged shape on both read and write so a
/// malformed provider payload never silently becomes an opaque blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
}

/// An ordered, append-only element within a turn.
///
/// Once written, `sequence` and content are immutable — the store never
/// exposes an update path for an existing block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnBlock {
    pub turn_id: Uuid,
    pub sequence: u32,
    pub block_type: BlockType,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub content: BlockContent,
    /// Opaque, provider-specific extra data. The core never introspects
    /// this; it is round-tripped byte-for-byte.
    #[serde(default)]
    pub provider_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_side: Option<ExecutionSide>,
}

impl TurnBlock {
    pub fn text(turn_id: Uuid, sequence: u32, text: impl Into<String>) -> Self {
        Self {
            turn_id,
            sequence,
            block_type: BlockType::Text,
            text_content: Some(text.into()),
            content: BlockContent::default(),
            provider_data: None,
            execution_side: None,
        }
    }

    /// Whether persisting this block is worthwhile at all — an empty,
    /// content-free slot (e.g. a cancelled block with no deltas received)
    /// is dropped rather than written.
    pub fn has_content(&self) -> bool {
        self.text_content.as_ref().is_some_and(|t| !t.is_empty())
            || self.provider_data.is_some()
            || self.content.tool_use_id.is_some()
            || self.content.tool_name.is_some()
            || self.content.tool_input.is_some()
            || self.content.reference_id.is_some()
            || self.content.image_url.is_some()
            || self.content.query.is_some()
            || self.content.results.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_eligible_excludes_assistant_only_types() {
        assert!(!BlockType::ToolUse.user_eligible());
        assert!(!BlockType::Thinking.user_eligible());
        assert!(BlockType::Text.user_eligible());
        assert!(BlockType::ToolResult.user_eligible());
    }

    #[test]
    fn assistant_eligible_excludes_user_only_types() {
        assert!(!BlockType::Image.assistant_eligible());
        assert!(!BlockType::PartialReference.assistant_eligible());
        assert!(BlockType::ToolUse.assistant_eligible());
        assert!(BlockType::ToolResult.assistant_eligible());
    }

    #[test]
    fn empty_text_block_has_no_content() {
        let b = TurnBlock::text(Uuid::nil(), 0, "");
        assert!(!b.has_content());
    }

    #[test]
    fn nonempty_text_block_has_content() {
        let b = TurnBlock::text(Uuid::nil(), 0, "hi");
        assert!(b.has_content());
    }
}
