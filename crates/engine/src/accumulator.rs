//! Block Accumulator — stateful fold from provider deltas to finished
//! [`TurnBlock`]s.
//!
//! Grounded on the teacher's turn loop (`gateway/runtime/turn.rs`), which
//! folds streamed tokens into an assistant message via a `tc_bufs` map
//! keyed by tool-call id; generalized here from a single text buffer plus a
//! side map into one slot per block index, since this system's wire
//! vocabulary is block-centric rather than token-centric.

use std::collections::HashMap;

use dw_domain::block::{BlockContent, BlockType, ExecutionSide, TurnBlock};
use dw_domain::error::{Error, Result};
use dw_domain::stream::{BlockStartMeta, DeltaType};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Slot {
    block_type: BlockType,
    text: String,
    json_buf: String,
    signature: Option<String>,
    provider_data: Option<serde_json::Value>,
    tool_use_id: Option<String>,
    tool_name: Option<String>,
    execution_side: Option<ExecutionSide>,
}

impl Slot {
    fn new() -> Self {
        Self {
            block_type: BlockType::Text,
            text: String::new(),
            json_buf: String::new(),
            signature: None,
            provider_data: None,
            tool_use_id: None,
            tool_name: None,
            execution_side: None,
        }
    }

    fn apply_start(&mut self, meta: BlockStartMeta) {
        self.block_type = meta.block_type;
        self.tool_use_id = meta.tool_use_id;
        self.tool_name = meta.tool_name;
        self.execution_side = meta.execution_side;
        self.provider_data = meta.provider_data;
    }

    fn finalize(&self) -> Result<TurnBlock> {
        let mut content = BlockContent::default();
        let mut text_content = None;

        match self.block_type {
            BlockType::Text | BlockType::Thinking => {
                text_content = Some(self.text.clone());
            }
            BlockType::ToolUse => {
                let tool_input = if self.json_buf.trim().is_empty() {
                    serde_json::Value::Object(Default::default())
                } else {
                    serde_json::from_str(&self.json_buf).map_err(|e| {
                        Error::Validation(format!("invalid tool_use input JSON: {e}"))
                    })?
                };
                content.tool_use_id = self.tool_use_id.clone();
                content.tool_name = self.tool_name.clone();
                content.tool_input = Some(tool_input);
            }
            BlockType::WebSearchUse => {
                content.query = Some(self.text.clone());
            }
            BlockType::WebSearchResult => {
                if !self.json_buf.trim().is_empty() {
                    content.results = serde_json::from_str(&self.json_buf).ok();
                }
            }
            BlockType::ToolResult | BlockType::Image | BlockType::Reference | BlockType::PartialReference => {
                // The accumulator never originates these — tool results are
                // appended directly by the executor's tool loop, and the
                // remaining types only ever arrive on user turns.
            }
        }

        if let Some(sig) = &self.signature {
            content.signature = Some(sig.clone());
        }

        Ok(TurnBlock {
            turn_id: Uuid::nil(),
            sequence: 0,
            block_type: self.block_type,
            text_content,
            content,
            provider_data: self.provider_data.clone(),
            execution_side: self.execution_side,
        })
    }
}

/// Whether a delta was the first one seen for its block index — tells the
/// turn executor whether to emit `block_start` before `block_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Started(BlockType),
    Continued,
}

/// Owned exclusively by one turn executor; never shared across tasks.
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    slots: HashMap<u32, Slot>,
}

impl BlockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into its slot, initializing the slot on first sight.
    pub fn on_delta(
        &mut self,
        block_index: u32,
        delta_type: DeltaType,
        payload: &str,
        start: Option<BlockStartMeta>,
    ) -> DeltaOutcome {
        let is_new = !self.slots.contains_key(&block_index);
        let slot = self.slots.entry(block_index).or_insert_with(Slot::new);
        if let Some(meta) = start {
            slot.apply_start(meta);
        }

        match delta_type {
            DeltaType::Text | DeltaType::Thinking => slot.text.push_str(payload),
            DeltaType::JsonInput => slot.json_buf.push_str(payload),
            DeltaType::Signature => {
                let mut sig = slot.signature.take().unwrap_or_default();
                sig.push_str(payload);
                slot.signature = Some(sig);
            }
        }

        if is_new {
            DeltaOutcome::Started(slot.block_type)
        } else {
            DeltaOutcome::Continued
        }
    }

    /// Finalize and remove the slot, parsing any accumulated partial JSON.
    /// Errors (malformed tool_use input) leave the slot consumed — the
    /// caller is expected to transition the turn to error on `Err`.
    pub fn on_block_complete(&mut self, block_index: u32) -> Result<TurnBlock> {
        let slot = self.slots.remove(&block_index).ok_or_else(|| {
            Error::Validation(format!("block_stop for unknown block_index {block_index}"))
        })?;
        slot.finalize()
    }

    /// Non-destructive read of the current partial state, for catch-up of
    /// an in-flight block or for persisting a cancelled turn's last block.
    pub fn snapshot(&self, block_index: u32) -> Option<TurnBlock> {
        self.slots.get(&block_index).and_then(|s| s.finalize().ok())
    }

    /// All slots still open, in ascending index order — used when a turn is
    /// cancelled or times out and every incomplete block must be persisted
    /// as-is.
    pub fn snapshot_incomplete(&self) -> Vec<(u32, TurnBlock)> {
        let mut indices: Vec<u32> = self.slots.keys().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(|i| self.snapshot(i).map(|b| (i, b)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop a slot without finalizing it — used when the provider hands the
    /// executor an already-finalized [`TurnBlock`] directly (the normal
    /// path: every adapter emits a terminal `Block` event of its own rather
    /// than relying on this accumulator to reconstruct one).
    pub fn discard(&mut self, block_index: u32) {
        self.slots.remove(&block_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dw_domain::block::BlockType;

    #[test]
    fn text_block_accumulates_across_deltas() {
        let mut acc = BlockAccumulator::new();
        acc.on_delta(0, DeltaType::Text, "Hi ", Some(BlockStartMeta {
            block_type: BlockType::Text,
            ..Default::default()
        }));
        acc.on_delta(0, DeltaType::Text, "there.", None);
        let block = acc.on_block_complete(0).unwrap();
        assert_eq!(block.text_content.as_deref(), Some("Hi there."));
    }

    #[test]
    fn first_delta_for_index_reports_started() {
        let mut acc = BlockAccumulator::new();
        let outcome = acc.on_delta(0, DeltaType::Text, "a", Some(BlockStartMeta {
            block_type: BlockType::Text,
            ..Default::default()
        }));
        assert_eq!(outcome, DeltaOutcome::Started(BlockType::Text));
        let outcome2 = acc.on_delta(0, DeltaType::Text, "b", None);
        assert_eq!(outcome2, DeltaOutcome::Continued);
    }

    #[test]
    fn interleaved_block_indices_track_independently() {
        let mut acc = BlockAccumulator::new();
        acc.on_delta(0, DeltaType::Text, "A", Some(BlockStartMeta { block_type: BlockType::Text, ..Default::default() }));
        acc.on_delta(1, DeltaType::JsonInput, "{\"path\"", Some(BlockStartMeta {
            block_type: BlockType::ToolUse,
            tool_use_id: Some("tu_1".into()),
            tool_name: Some("doc_view".into()),
            ..Default::default()
        }));
        acc.on_delta(0, DeltaType::Text, "B", None);
        acc.on_delta(1, DeltaType::JsonInput, ":\"/a\"}", None);

        let b0 = acc.on_block_complete(0).unwrap();
        assert_eq!(b0.text_content.as_deref(), Some("AB"));

        let b1 = acc.on_block_complete(1).unwrap();
        assert_eq!(b1.content.tool_input.unwrap()["path"], "/a");
    }

    #[test]
    fn invalid_tool_use_json_errors_on_complete() {
        let mut acc = BlockAccumulator::new();
        acc.on_delta(0, DeltaType::JsonInput, "{not valid", Some(BlockStartMeta {
            block_type: BlockType::ToolUse,
            tool_use_id: Some("tu_1".into()),
            tool_name: Some("doc_view".into()),
            ..Default::default()
        }));
        assert!(acc.on_block_complete(0).is_err());
    }

    #[test]
    fn empty_tool_use_json_defaults_to_empty_object() {
        let mut acc = BlockAccumulator::new();
        acc.on_delta(0, DeltaType::JsonInput, "", Some(BlockStartMeta {
            block_type: BlockType::ToolUse,
            tool_use_id: Some("tu_1".into()),
            tool_name: Some("doc_tree".into()),
            ..Default::default()
        }));
        let block = acc.on_block_complete(0).unwrap();
        assert_eq!(block.content.tool_input, Some(serde_json::json!({})));
    }

    #[test]
    fn snapshot_does_not_clear_slot() {
        let mut acc = BlockAccumulator::new();
        acc.on_delta(0, DeltaType::Text, "partial", Some(BlockStartMeta { block_type: BlockType::Text, ..Default::default() }));
        let snap = acc.snapshot(0).unwrap();
        assert_eq!(snap.text_content.as_deref(), Some("partial"));
        assert!(!acc.is_empty());
    }

    #[test]
    fn complete_on_unknown_index_is_validation_error() {
        let mut acc = BlockAccumulator::new();
        let err = acc.on_block_complete(5).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn snapshot_incomplete_returns_all_open_slots_in_order() {
        let mut acc = BlockAccumulator::new();
        acc.on_delta(2, DeltaType::Text, "c", Some(BlockStartMeta { block_type: BlockType::Text, ..Default::default() }));
        acc.on_delta(0, DeltaType::Text, "a", Some(BlockStartMeta { block_type: BlockType::Text, ..Default::default() }));
        let snaps = acc.snapshot_incomplete();
        let indices: Vec<u32> = snaps.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
    }
}
