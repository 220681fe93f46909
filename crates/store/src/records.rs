//! Read-path result shapes returned by [`crate::Store`] queries.
//!
//! These are assembly types, not persisted records — they exist so callers
//! (the engine, the gateway's HTTP handlers) get pre-joined data without
//! issuing their own N+1 follow-up queries.

use dw_domain::block::TurnBlock;
use dw_domain::turn::Turn;
use uuid::Uuid;

/// Direction for [`crate::Store::get_paginated_turns`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Before,
    After,
    Both,
}

/// A turn enriched with its blocks and sibling ids, for pagination and
/// branch-switcher responses.
#[derive(Debug, Clone)]
pub struct TurnWithBlocks {
    pub turn: Turn,
    pub blocks: Vec<TurnBlock>,
    pub sibling_ids: Vec<Uuid>,
}

/// One page of a chat's turn forest along a single branch.
#[derive(Debug, Clone)]
pub struct PaginatedTurns {
    pub turns: Vec<TurnWithBlocks>,
    pub has_more_before: bool,
    pub has_more_after: bool,
}

/// Lightweight node for [`crate::Store::get_chat_tree`] — just enough
/// structure for a client to validate its cached tree shape without
/// downloading block content.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ChatTreeNode {
    pub id: Uuid,
    pub prev_turn_id: Option<Uuid>,
}
