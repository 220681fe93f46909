//! Catch-up Protocol & Serializer.
//!
//! No teacher equivalent — the teacher's runs have no reconnect story
//! beyond replaying the whole `Run` object. Two serializers live here for
//! two different audiences: [`catchup_event`]/[`catchup_events`] turn a
//! persisted block into the single `block_catchup` event a *reconnecting*
//! client receives (the wire vocabulary's dedicated event for "here's a
//! block you missed entirely"), while [`serialize_block`]/[`serialize_blocks`]
//! synthesize the ordinary `block_start`/`block_delta`/`block_stop` triple a
//! *live* viewer sees — used by the executor to fan out non-streaming
//! blocks (tool results) so a client watching in real time isn't exposed to
//! the catch-up-only event type.

use dw_domain::block::{BlockContent, BlockType, TurnBlock};
use dw_domain::stream::DeltaType;
use dw_domain::trace::TraceEvent;
use dw_domain::turn::{Turn, TurnStatus};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::event::TurnEvent;
use crate::hub::{Envelope, StreamHub};

/// Convert one persisted block into its canonical replay sequence.
pub fn serialize_block(block: &TurnBlock) -> Vec<TurnEvent> {
    let mut events = vec![TurnEvent::BlockStart {
        block_index: block.sequence,
        block_type: Some(block.block_type),
    }];

    // Text payload and structured content are orthogonal — a tool_result
    // block carries both its output string in `text_content` and its
    // `tool_use_id`/`is_error` in `content`, so both deltas are emitted when
    // present rather than branching exclusively on block_type.
    if let Some(text) = block.text_content.as_ref().filter(|t| !t.is_empty()) {
        events.push(TurnEvent::BlockDelta {
            block_index: block.sequence,
            delta_type: if block.block_type == BlockType::Thinking {
                DeltaType::Thinking
            } else {
                DeltaType::Text
            },
            text_delta: Some(text.clone()),
            json_delta: None,
            signature_delta: None,
        });
    }

    if content_has_structured_fields(&block.content) {
        if let Ok(json) = serde_json::to_string(&block.content) {
            events.push(TurnEvent::BlockDelta {
                block_index: block.sequence,
                delta_type: DeltaType::JsonInput,
                text_delta: None,
                json_delta: Some(json),
                signature_delta: None,
            });
        }
    }

    if let Some(sig) = &block.content.signature {
        events.push(TurnEvent::BlockDelta {
            block_index: block.sequence,
            delta_type: DeltaType::Signature,
            text_delta: None,
            json_delta: None,
            signature_delta: Some(sig.clone()),
        });
    }

    events.push(TurnEvent::BlockStop {
        block_index: block.sequence,
    });
    events
}

/// Whether `content` has any field set beyond the signature (which the
/// caller emits as its own delta) — i.e. whether a json delta is worth
/// sending at all.
fn content_has_structured_fields(content: &BlockContent) -> bool {
    content.tool_use_id.is_some()
        || content.tool_name.is_some()
        || content.tool_input.is_some()
        || content.is_error.is_some()
        || content.reference_id.is_some()
        || content.image_url.is_some()
        || content.media_type.is_some()
        || content.query.is_some()
        || content.results.is_some()
}

pub fn serialize_blocks(blocks: &[TurnBlock]) -> Vec<TurnEvent> {
    blocks.iter().flat_map(serialize_block).collect()
}

/// Convert one persisted block into the single `block_catchup` event a
/// reconnecting client receives for it.
pub fn catchup_event(block: &TurnBlock) -> TurnEvent {
    TurnEvent::BlockCatchup {
        block: block.clone(),
    }
}

pub fn catchup_events(blocks: &[TurnBlock]) -> Vec<TurnEvent> {
    blocks.iter().map(catchup_event).collect()
}

fn terminal_event(turn: &Turn) -> TurnEvent {
    match turn.status {
        TurnStatus::Cancelled => TurnEvent::TurnError {
            turn_id: turn.id,
            error: "turn was cancelled".into(),
            is_cancelled: true,
            last_block_index: None,
        },
        TurnStatus::Error => TurnEvent::TurnError {
            turn_id: turn.id,
            error: turn
                .response_metadata
                .as_ref()
                .and_then(|m| m.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("turn ended in error")
                .to_string(),
            is_cancelled: false,
            last_block_index: None,
        },
        _ => TurnEvent::TurnComplete {
            turn_id: turn.id,
            stop_reason: turn.stop_reason.clone().unwrap_or_default(),
            input_tokens: turn.input_tokens.unwrap_or(0),
            output_tokens: turn.output_tokens.unwrap_or(0),
            response_metadata: turn.response_metadata.clone(),
        },
    }
}

/// What a reconnecting client should receive, and whether it should keep
/// listening afterward.
pub struct CatchupPlan {
    /// Events to emit, in order, before the client starts receiving live
    /// broadcast traffic (or before closing the connection, if `live` is
    /// `None`).
    pub replay: Vec<TurnEvent>,
    /// Present iff the turn is still streaming. Subscribed atomically with
    /// the buffer-tail read inside `StreamHub::catch_up`, so there is no
    /// window between "gather replay" and "start listening live" for an
    /// event to fall through — every `publish` after the hub existed lands
    /// in `replay`'s tail or on this receiver, never neither.
    pub live: Option<broadcast::Receiver<Envelope>>,
}

/// The turn is terminal with no hub and no persisted trace to replay from
/// — the client asked to resume a turn nobody can account for.
pub struct Abandoned;

/// Build the catch-up plan for a reconnecting SSE client.
///
/// `read_persisted` is only invoked while a hub exists, under that hub's
/// catch-up mutex, to close the persist/clear race described in the
/// component design.
pub fn build_plan(
    turn: &Turn,
    hub: Option<Arc<StreamHub>>,
    last_event_id: u64,
    read_persisted: impl FnOnce() -> Vec<TurnBlock>,
    persisted_terminal: Vec<TurnBlock>,
) -> Result<CatchupPlan, Abandoned> {
    match hub {
        Some(hub) => {
            let (persisted, tail, receiver) = hub.catch_up(last_event_id, read_persisted);
            TraceEvent::CatchupServed {
                turn_id: turn.id.to_string(),
                last_event_id: Some(last_event_id),
                replayed_blocks: persisted.len(),
                buffered_events: tail.len(),
            }
            .emit();
            let mut replay = catchup_events(&persisted);
            replay.extend(tail.into_iter().map(|e| e.event));
            Ok(CatchupPlan {
                replay,
                live: Some(receiver),
            })
        }
        None => {
            if turn.is_terminal() {
                TraceEvent::CatchupServed {
                    turn_id: turn.id.to_string(),
                    last_event_id: None,
                    replayed_blocks: persisted_terminal.len(),
                    buffered_events: 0,
                }
                .emit();
                let mut replay = catchup_events(&persisted_terminal);
                replay.push(terminal_event(turn));
                Ok(CatchupPlan { replay, live: None })
            } else {
                Err(Abandoned)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn text_block(seq: u32, text: &str) -> TurnBlock {
        TurnBlock::text(Uuid::nil(), seq, text)
    }

    #[test]
    fn serialize_block_emits_start_delta_stop() {
        let block = text_block(0, "hello");
        let events = serialize_block(&block);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].name(), "block_start");
        assert_eq!(events[1].name(), "block_delta");
        assert_eq!(events[2].name(), "block_stop");
    }

    #[test]
    fn no_hub_and_nonterminal_turn_is_abandoned() {
        let turn = Turn::new_assistant_pending(Uuid::new_v4(), None, Some("x".into()));
        let result = build_plan(&turn, None, 0, || vec![], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn no_hub_and_terminal_turn_replays_then_emits_terminal_event() {
        let mut turn = Turn::new_assistant_pending(Uuid::new_v4(), None, Some("x".into()));
        turn.status = TurnStatus::Complete;
        turn.stop_reason = Some("end_turn".into());
        let blocks = vec![text_block(0, "hi")];
        let plan = build_plan(&turn, None, 0, || vec![], blocks).unwrap();
        assert!(plan.live.is_none());
        assert_eq!(plan.replay[0].name(), "block_catchup");
        assert_eq!(plan.replay.last().unwrap().name(), "turn_complete");
    }

    #[test]
    fn hub_present_combines_persisted_catchup_and_buffered_tail() {
        let turn = Turn::new_assistant_pending(Uuid::new_v4(), None, Some("x".into()));
        let hub = Arc::new(StreamHub::new(turn.id, 100));
        hub.publish(TurnEvent::BlockStart { block_index: 1, block_type: None });
        let plan = build_plan(&turn, Some(hub), 0, || vec![text_block(0, "hi")], vec![]).unwrap();
        assert!(plan.live.is_some());
        assert_eq!(plan.replay[0].name(), "block_catchup");
        assert!(plan.replay.iter().any(|e| e.name() == "block_start"));
    }

    #[test]
    fn catchup_events_emit_one_event_per_block() {
        let blocks = vec![text_block(0, "hi"), text_block(1, "there")];
        let events = catchup_events(&blocks);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.name() == "block_catchup"));
    }

    #[test]
    fn hub_present_subscription_catches_event_published_immediately_after() {
        let turn = Turn::new_assistant_pending(Uuid::new_v4(), None, Some("x".into()));
        let hub = Arc::new(StreamHub::new(turn.id, 100));
        let plan = build_plan(&turn, Some(hub.clone()), 0, || vec![], vec![]).unwrap();
        hub.publish(TurnEvent::BlockStop { block_index: 0 });
        let mut rx = plan.live.unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
