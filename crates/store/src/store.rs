//! The turn & block store: the engine's only durable persistence layer.
//!
//! No SQL engine. Chats, turns, and blocks live in `parking_lot::RwLock`-
//! guarded in-memory indexes, backed by an append-only JSONL log per entity
//! kind under the configured storage root and replayed on startup. This
//! generalizes the run-store ring-buffer-plus-index pattern used elsewhere
//! in the gateway to an unbounded durable log — turns and blocks are never
//! evicted by the store itself, only stream hubs are evicted, by the
//! registry's sweeper.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use dw_domain::block::{BlockType, TurnBlock};
use dw_domain::chat::Chat;
use dw_domain::error::{Error, Result};
use dw_domain::trace::TraceEvent;
use dw_domain::turn::{Turn, TurnMetadataUpdate};

use crate::records::{ChatTreeNode, Direction, PaginatedTurns, TurnWithBlocks};
use crate::wal::Wal;

/// Safety cap on [`Store::get_path`] walks, guarding against a malformed
/// `prev_turn_id` cycle turning an ancestor walk into an infinite loop.
const DEFAULT_MAX_PATH_DEPTH: usize = 100;

/// Safety cap on how far [`Store::get_paginated_turns`] will descend the
/// most-recent-child branch while resolving a default anchor.
const DEFAULT_LEAF_DESCEND_DEPTH: usize = 1000;

struct StoreInner {
    chats: HashMap<Uuid, Chat>,
    turns: HashMap<Uuid, Turn>,
    blocks: HashMap<Uuid, Vec<TurnBlock>>,
    /// `(chat_id, prev_turn_id)` → turn ids sharing that parent, in
    /// `(created_at, id)` order. `prev_turn_id = None` keys the chat's root
    /// turns. Includes the turn itself, so a sibling lookup for any id
    /// naturally returns itself alongside its siblings.
    children: HashMap<(Uuid, Option<Uuid>), Vec<Uuid>>,
}

pub struct Store {
    inner: RwLock<StoreInner>,
    chats_wal: Wal,
    turns_wal: Wal,
    blocks_wal: Wal,
    max_path_depth: usize,
    leaf_descend_depth: usize,
}

impl Store {
    /// Open (or create) a store rooted at `storage_root`, replaying its
    /// JSONL logs to rebuild the in-memory indexes.
    pub fn open(storage_root: &Path) -> std::io::Result<Self> {
        let chats_wal = Wal::new(storage_root, "chats.jsonl")?;
        let turns_wal = Wal::new(storage_root, "turns.jsonl")?;
        let blocks_wal = Wal::new(storage_root, "blocks.jsonl")?;

        let mut chats = HashMap::new();
        for c in chats_wal.load::<Chat>() {
            chats.insert(c.id, c);
        }

        let mut turns = HashMap::new();
        for t in turns_wal.load::<Turn>() {
            turns.insert(t.id, t);
        }

        let mut blocks: HashMap<Uuid, Vec<TurnBlock>> = HashMap::new();
        for b in blocks_wal.load::<TurnBlock>() {
            blocks.entry(b.turn_id).or_default().push(b);
        }

        let mut children: HashMap<(Uuid, Option<Uuid>), Vec<Uuid>> = HashMap::new();
        let mut ordered: Vec<&Turn> = turns.values().collect();
        ordered.sort_by_key(|t| (t.created_at, t.id));
        for t in ordered {
            children.entry((t.chat_id, t.prev_turn_id)).or_default().push(t.id);
        }

        Ok(Self {
            inner: RwLock::new(StoreInner {
                chats,
                turns,
                blocks,
                children,
            }),
            chats_wal,
            turns_wal,
            blocks_wal,
            max_path_depth: DEFAULT_MAX_PATH_DEPTH,
            leaf_descend_depth: DEFAULT_LEAF_DESCEND_DEPTH,
        })
    }

    /// Override the ancestor-walk depth cap (tests, or a tighter config
    /// value than the built-in default).
    pub fn with_max_path_depth(mut self, depth: usize) -> Self {
        self.max_path_depth = depth;
        self
    }

    // ── Chats ────────────────────────────────────────────────────────
    // Not part of the named Turn & Block Store operation list, but the
    // minimal plumbing those operations need to exist at all.

    pub fn create_chat(&self, chat: Chat) -> Result<Chat> {
        let mut inner = self.inner.write();
        if inner.chats.contains_key(&chat.id) {
            return Err(Error::Conflict(format!("chat {} already exists", chat.id)));
        }
        self.chats_wal.append(&chat);
        inner.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    pub fn get_chat(&self, chat_id: Uuid) -> Result<Chat> {
        let inner = self.inner.read();
        inner
            .chats
            .get(&chat_id)
            .filter(|c| !c.is_deleted())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chat {chat_id}")))
    }

    // ── CreateTurn ───────────────────────────────────────────────────

    pub fn create_turn(&self, turn: Turn) -> Result<Turn> {
        let mut inner = self.inner.write();

        if inner.turns.contains_key(&turn.id) {
            return Err(Error::Conflict(format!("turn {} already exists", turn.id)));
        }
        if !inner.chats.contains_key(&turn.chat_id) {
            return Err(Error::NotFound(format!("chat {}", turn.chat_id)));
        }
        if let Some(prev_id) = turn.prev_turn_id {
            let parent = inner
                .turns
                .get(&prev_id)
                .ok_or_else(|| Error::NotFound(format!("parent turn {prev_id}")))?;
            if parent.chat_id != turn.chat_id {
                return Err(Error::Validation(format!(
                    "prev_turn_id {prev_id} belongs to a different chat"
                )));
            }
        }

        self.turns_wal.append(&turn);
        let key = (turn.chat_id, turn.prev_turn_id);
        insert_child_sorted(&mut inner.children, &inner.turns, key, turn.id, turn.created_at);
        inner.turns.insert(turn.id, turn.clone());

        TraceEvent::TurnCreated {
            chat_id: turn.chat_id.to_string(),
            turn_id: turn.id.to_string(),
            role: format!("{:?}", turn.role),
        }
        .emit();

        Ok(turn)
    }

    // ── CreateBlocks ─────────────────────────────────────────────────

    /// Atomic batch insert. Sequence numbers are assigned by the store
    /// starting at the next free slot for `turn_id`, in the order given —
    /// whatever `sequence`/`turn_id` the caller stamped on each block
    /// (often placeholders from a provider adapter's block accumulator)
    /// is overwritten here, since the store is the sole sequence
    /// authority.
    pub fn create_blocks(&self, turn_id: Uuid, blocks: Vec<TurnBlock>) -> Result<Vec<TurnBlock>> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.write();
        let role = inner
            .turns
            .get(&turn_id)
            .map(|t| t.role)
            .ok_or_else(|| Error::NotFound(format!("turn {turn_id}")))?;

        for b in &blocks {
            if !b.block_type.eligible_for(role) {
                return Err(Error::Validation(format!(
                    "block type {:?} is not eligible for a {role:?} turn",
                    b.block_type
                )));
            }
            if b.block_type == BlockType::ToolResult {
                let tool_use_id = b.content.tool_use_id.as_deref().ok_or_else(|| {
                    Error::Validation("tool_result block missing tool_use_id".into())
                })?;
                if !self.tool_use_known(&inner, turn_id, tool_use_id) {
                    return Err(Error::Validation(format!(
                        "tool_result references unknown tool_use_id {tool_use_id}"
                    )));
                }
            }
        }

        let next_seq = inner.blocks.get(&turn_id).map(|v| v.len() as u32).unwrap_or(0);
        let mut stamped = Vec::with_capacity(blocks.len());
        for (i, mut b) in blocks.into_iter().enumerate() {
            b.turn_id = turn_id;
            b.sequence = next_seq + i as u32;
            self.blocks_wal.append(&b);
            stamped.push(b);
        }

        inner.blocks.entry(turn_id).or_default().extend(stamped.iter().cloned());

        for b in &stamped {
            TraceEvent::BlockPersisted {
                turn_id: turn_id.to_string(),
                sequence: b.sequence,
                block_type: format!("{:?}", b.block_type),
            }
            .emit();
        }

        Ok(stamped)
    }

    fn tool_use_known(&self, inner: &StoreInner, turn_id: Uuid, tool_use_id: &str) -> bool {
        let matches_tool_use = |b: &TurnBlock| {
            b.block_type == BlockType::ToolUse && b.content.tool_use_id.as_deref() == Some(tool_use_id)
        };

        if inner.blocks.get(&turn_id).is_some_and(|bs| bs.iter().any(matches_tool_use)) {
            return true;
        }

        let Some(mut cur) = inner.turns.get(&turn_id).and_then(|t| t.prev_turn_id) else {
            return false;
        };
        let mut depth = 0;
        loop {
            if depth >= self.max_path_depth {
                return false;
            }
            if inner.blocks.get(&cur).is_some_and(|bs| bs.iter().any(matches_tool_use)) {
                return true;
            }
            match inner.turns.get(&cur).and_then(|t| t.prev_turn_id) {
                Some(next) => {
                    cur = next;
                    depth += 1;
                }
                None => return false,
            }
        }
    }

    // ── UpdateTurnMetadata ───────────────────────────────────────────

    pub fn update_turn_metadata(&self, turn_id: Uuid, update: TurnMetadataUpdate) -> Result<Turn> {
        if let Some(model) = &update.model {
            if model.trim().is_empty() {
                return Err(Error::Validation("model must not be empty".into()));
            }
        }

        let mut inner = self.inner.write();
        let turn = inner
            .turns
            .get_mut(&turn_id)
            .ok_or_else(|| Error::NotFound(format!("turn {turn_id}")))?;

        let status_change = update
            .status
            .filter(|s| *s != turn.status)
            .map(|s| (turn.status, s));

        if let Some(status) = update.status {
            turn.status = status;
        }
        if let Some(model) = update.model {
            turn.model = Some(model);
        }
        if let Some(v) = update.input_tokens {
            turn.input_tokens = Some(v);
        }
        if let Some(v) = update.output_tokens {
            turn.output_tokens = Some(v);
        }
        if let Some(sr) = update.stop_reason {
            turn.stop_reason = Some(sr);
        }
        if let Some(meta) = update.response_metadata {
            turn.response_metadata = Some(meta);
        }
        if update.mark_completed {
            turn.completed_at = Some(Utc::now());
        }

        let snapshot = turn.clone();
        self.turns_wal.append(&snapshot);

        if let Some((from, to)) = status_change {
            TraceEvent::TurnStatusChanged {
                turn_id: turn_id.to_string(),
                from: format!("{from:?}"),
                to: format!("{to:?}"),
            }
            .emit();
        }

        Ok(snapshot)
    }

    // ── GetTurn / GetBlocks / GetBlocksForTurns ──────────────────────

    pub fn get_turn(&self, turn_id: Uuid) -> Result<Turn> {
        let inner = self.inner.read();
        inner
            .turns
            .get(&turn_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("turn {turn_id}")))
    }

    pub fn get_blocks(&self, turn_id: Uuid) -> Result<Vec<TurnBlock>> {
        let inner = self.inner.read();
        if !inner.turns.contains_key(&turn_id) {
            return Err(Error::NotFound(format!("turn {turn_id}")));
        }
        Ok(inner.blocks.get(&turn_id).cloned().unwrap_or_default())
    }

    /// Batch form: one lock acquisition, one map lookup per id, no
    /// per-turn round trip — the N+1 prohibition is part of the contract.
    pub fn get_blocks_for_turns(&self, turn_ids: &[Uuid]) -> HashMap<Uuid, Vec<TurnBlock>> {
        let inner = self.inner.read();
        Self::get_blocks_for_turns_locked(&inner, turn_ids)
    }

    fn get_blocks_for_turns_locked(inner: &StoreInner, turn_ids: &[Uuid]) -> HashMap<Uuid, Vec<TurnBlock>> {
        turn_ids
            .iter()
            .map(|id| (*id, inner.blocks.get(id).cloned().unwrap_or_default()))
            .collect()
    }

    // ── GetPath ──────────────────────────────────────────────────────

    pub fn get_path(&self, turn_id: Uuid) -> Result<Vec<Turn>> {
        let inner = self.inner.read();
        let mut chain = Vec::new();
        let mut cur = Some(turn_id);
        let mut depth = 0;
        while let Some(id) = cur {
            if depth > self.max_path_depth {
                return Err(Error::Validation(format!(
                    "ancestor path from {turn_id} exceeds max depth {}",
                    self.max_path_depth
                )));
            }
            let t = inner
                .turns
                .get(&id)
                .ok_or_else(|| Error::NotFound(format!("turn {id}")))?;
            chain.push(t.clone());
            cur = t.prev_turn_id;
            depth += 1;
        }
        chain.reverse();
        Ok(chain)
    }

    // ── GetSiblingIds ────────────────────────────────────────────────

    pub fn get_sibling_ids(&self, turn_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Uuid>>> {
        let inner = self.inner.read();
        Self::get_sibling_ids_locked(&inner, turn_ids)
    }

    fn get_sibling_ids_locked(inner: &StoreInner, turn_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Uuid>>> {
        let mut out = HashMap::with_capacity(turn_ids.len());
        for id in turn_ids {
            let turn = inner
                .turns
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("turn {id}")))?;
            let sibs = inner
                .children
                .get(&(turn.chat_id, turn.prev_turn_id))
                .cloned()
                .unwrap_or_default();
            out.insert(*id, sibs);
        }
        Ok(out)
    }

    // ── GetTurnSiblings ──────────────────────────────────────────────

    pub fn get_turn_siblings(&self, turn_id: Uuid) -> Result<Vec<TurnWithBlocks>> {
        let inner = self.inner.read();
        let anchor = inner
            .turns
            .get(&turn_id)
            .ok_or_else(|| Error::NotFound(format!("turn {turn_id}")))?;
        let sibling_ids = inner
            .children
            .get(&(anchor.chat_id, anchor.prev_turn_id))
            .cloned()
            .unwrap_or_default();

        Ok(sibling_ids
            .iter()
            .filter_map(|id| {
                let turn = inner.turns.get(id)?.clone();
                let blocks = inner.blocks.get(id).cloned().unwrap_or_default();
                Some(TurnWithBlocks {
                    turn,
                    blocks,
                    sibling_ids: sibling_ids.clone(),
                })
            })
            .collect())
    }

    // ── GetChatTree ──────────────────────────────────────────────────

    pub fn get_chat_tree(&self, chat_id: Uuid) -> Result<Vec<ChatTreeNode>> {
        let inner = self.inner.read();
        if !inner.chats.contains_key(&chat_id) {
            return Err(Error::NotFound(format!("chat {chat_id}")));
        }

        let mut result = Vec::new();
        let mut stack: Vec<Uuid> = inner.children.get(&(chat_id, None)).cloned().unwrap_or_default();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let prev_turn_id = inner.turns.get(&id).and_then(|t| t.prev_turn_id);
            result.push(ChatTreeNode { id, prev_turn_id });
            let mut kids = inner.children.get(&(chat_id, Some(id))).cloned().unwrap_or_default();
            kids.reverse();
            stack.extend(kids);
        }
        Ok(result)
    }

    // ── GetPaginatedTurns ────────────────────────────────────────────

    pub fn get_paginated_turns(
        &self,
        chat_id: Uuid,
        from_turn_id: Option<Uuid>,
        limit: usize,
        direction: Direction,
    ) -> Result<PaginatedTurns> {
        let mut inner = self.inner.write();
        if !inner.chats.contains_key(&chat_id) {
            return Err(Error::NotFound(format!("chat {chat_id}")));
        }

        let explicit_anchor = from_turn_id.is_some();
        let anchor = match from_turn_id {
            Some(id) => {
                if !inner.turns.contains_key(&id) {
                    return Err(Error::NotFound(format!("turn {id}")));
                }
                id
            }
            None => {
                let cursor = inner.chats.get(&chat_id).and_then(|c| c.last_viewed_turn_id);
                match cursor.filter(|id| inner.turns.contains_key(id)) {
                    Some(id) => id,
                    None => self
                        .resolve_latest_leaf(&inner, chat_id)
                        .ok_or_else(|| Error::NotFound(format!("chat {chat_id} has no turns")))?,
                }
            }
        };

        let (before_ids, has_more_before, after_ids, has_more_after) = match direction {
            Direction::Before => {
                let (ids, more) = self.walk_before(&inner, anchor, limit);
                (ids, more, Vec::new(), false)
            }
            Direction::After => {
                let (ids, more) = self.walk_after(&inner, chat_id, anchor, limit);
                (Vec::new(), false, ids, more)
            }
            Direction::Both => {
                // 25% before / 75% after: users usually want to see the
                // continuation of a selected turn; history is cheap to
                // scroll back for.
                let limit_before = (limit / 4).max(1).min(limit.max(1));
                let limit_after = limit.saturating_sub(limit_before);
                let (b_ids, hb) = self.walk_before(&inner, anchor, limit_before);
                let (a_ids, ha) = self.walk_after(&inner, chat_id, anchor, limit_after);
                (b_ids, hb, a_ids, ha)
            }
        };

        // `before_ids` already ends with the anchor (chronological order);
        // if this was an after-only page it won't, so add it — either way
        // the anchor appears exactly once.
        let mut ordered_ids = before_ids;
        if ordered_ids.last() != Some(&anchor) {
            ordered_ids.push(anchor);
        }
        ordered_ids.extend(after_ids);

        let turns_vec: Vec<Turn> = ordered_ids
            .iter()
            .filter_map(|id| inner.turns.get(id).cloned())
            .collect();
        let ids_for_batch: Vec<Uuid> = turns_vec.iter().map(|t| t.id).collect();
        let blocks_map = Self::get_blocks_for_turns_locked(&inner, &ids_for_batch);
        let siblings_map = Self::get_sibling_ids_locked(&inner, &ids_for_batch)?;

        let turns = turns_vec
            .into_iter()
            .map(|t| {
                let blocks = blocks_map.get(&t.id).cloned().unwrap_or_default();
                let sibling_ids = siblings_map.get(&t.id).cloned().unwrap_or_default();
                TurnWithBlocks { turn: t, blocks, sibling_ids }
            })
            .collect();

        if explicit_anchor {
            if let Some(chat) = inner.chats.get_mut(&chat_id) {
                chat.last_viewed_turn_id = Some(anchor);
                self.chats_wal.append(chat);
            } else {
                tracing::warn!(%chat_id, "could not advance last_viewed_turn_id: chat vanished mid-call");
            }
        }

        Ok(PaginatedTurns { turns, has_more_before, has_more_after })
    }

    fn resolve_latest_leaf(&self, inner: &StoreInner, chat_id: Uuid) -> Option<Uuid> {
        let mut candidate = inner
            .turns
            .values()
            .filter(|t| t.chat_id == chat_id)
            .max_by_key(|t| (t.created_at, t.id))?
            .id;

        let mut depth = 0;
        while depth < self.leaf_descend_depth {
            let next = inner
                .children
                .get(&(chat_id, Some(candidate)))
                .and_then(|kids| kids.iter().max_by_key(|id| inner.turns.get(id).map(|t| t.created_at)).copied());
            match next {
                Some(n) if n != candidate => {
                    candidate = n;
                    depth += 1;
                }
                _ => break,
            }
        }
        Some(candidate)
    }

    /// Walk `prev_turn_id` from `anchor` up to `limit` steps past the
    /// anchor itself, reversed into chronological (root-first) order.
    fn walk_before(&self, inner: &StoreInner, anchor: Uuid, limit: usize) -> (Vec<Uuid>, bool) {
        let mut ids = vec![anchor];
        let mut cur = inner.turns.get(&anchor).and_then(|t| t.prev_turn_id);
        let mut steps = 0;
        let mut has_more = false;
        while let Some(id) = cur {
            if steps == limit {
                has_more = true;
                break;
            }
            ids.push(id);
            cur = inner.turns.get(&id).and_then(|t| t.prev_turn_id);
            steps += 1;
        }
        ids.reverse();
        (ids, has_more)
    }

    /// Descend the most-recent-child branch from `anchor`, `limit` steps,
    /// excluding the anchor itself.
    fn walk_after(&self, inner: &StoreInner, chat_id: Uuid, anchor: Uuid, limit: usize) -> (Vec<Uuid>, bool) {
        let mut ids = Vec::new();
        let mut cur = anchor;
        let mut steps = 0;
        let mut has_more = false;
        loop {
            if steps == limit {
                has_more = inner
                    .children
                    .get(&(chat_id, Some(cur)))
                    .is_some_and(|kids| !kids.is_empty());
                break;
            }
            let next = inner
                .children
                .get(&(chat_id, Some(cur)))
                .and_then(|kids| kids.iter().max_by_key(|id| inner.turns.get(id).map(|t| t.created_at)).copied());
            match next {
                Some(n) => {
                    ids.push(n);
                    cur = n;
                    steps += 1;
                }
                None => break,
            }
        }
        (ids, has_more)
    }
}

/// Insert `turn_id` into its sibling list keeping `(created_at, id)` order.
/// A free function (not a `Store`/`StoreInner` method) so the call site can
/// borrow `children` and `turns` as disjoint fields of the same guard.
fn insert_child_sorted(
    children: &mut HashMap<(Uuid, Option<Uuid>), Vec<Uuid>>,
    turns: &HashMap<Uuid, Turn>,
    key: (Uuid, Option<Uuid>),
    turn_id: Uuid,
    created_at: DateTime<Utc>,
) {
    let entry = children.entry(key).or_default();
    let pos = entry.partition_point(|id| {
        let existing = turns.get(id).map(|t| t.created_at).unwrap_or(created_at);
        (existing, *id) < (created_at, turn_id)
    });
    entry.insert(pos, turn_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dw_domain::block::BlockContent;
    use dw_domain::turn::TurnStatus;

    fn new_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn seed_chat(store: &Store) -> Chat {
        let chat = Chat::new(Uuid::new_v4(), Uuid::new_v4());
        store.create_chat(chat).unwrap()
    }

    #[test]
    fn create_turn_rejects_missing_parent() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = Turn::new_user(chat.id, Some(Uuid::new_v4()));
        let err = store.create_turn(turn).unwrap_err();
        assert_eq!(err.category(), "not_found");
    }

    #[test]
    fn create_turn_rejects_missing_chat() {
        let (_dir, store) = new_store();
        let turn = Turn::new_user(Uuid::new_v4(), None);
        let err = store.create_turn(turn).unwrap_err();
        assert_eq!(err.category(), "not_found");
    }

    #[test]
    fn create_turn_rejects_duplicate_id() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = Turn::new_user(chat.id, None);
        store.create_turn(turn.clone()).unwrap();
        let err = store.create_turn(turn).unwrap_err();
        assert_eq!(err.category(), "conflict");
    }

    #[test]
    fn create_blocks_assigns_sequence_from_next_free_slot() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = store.create_turn(Turn::new_assistant_pending(chat.id, None, None)).unwrap();

        let first = store
            .create_blocks(turn.id, vec![TurnBlock::text(Uuid::nil(), 99, "hello")])
            .unwrap();
        assert_eq!(first[0].sequence, 0);
        assert_eq!(first[0].turn_id, turn.id);

        let second = store
            .create_blocks(turn.id, vec![TurnBlock::text(Uuid::nil(), 0, " world")])
            .unwrap();
        assert_eq!(second[0].sequence, 1);
    }

    #[test]
    fn create_blocks_rejects_ineligible_block_type() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = store.create_turn(Turn::new_user(chat.id, None)).unwrap();

        let mut block = TurnBlock::text(Uuid::nil(), 0, "thinking out loud");
        block.block_type = BlockType::Thinking;
        let err = store.create_blocks(turn.id, vec![block]).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn create_blocks_rejects_tool_result_without_matching_tool_use() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = store.create_turn(Turn::new_assistant_pending(chat.id, None, None)).unwrap();

        let mut block = TurnBlock::text(Uuid::nil(), 0, "");
        block.block_type = BlockType::ToolResult;
        block.content = BlockContent {
            tool_use_id: Some("call_1".into()),
            ..Default::default()
        };
        let err = store.create_blocks(turn.id, vec![block]).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn create_blocks_accepts_tool_result_with_matching_tool_use() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = store.create_turn(Turn::new_assistant_pending(chat.id, None, None)).unwrap();

        let mut tool_use = TurnBlock::text(Uuid::nil(), 0, "");
        tool_use.block_type = BlockType::ToolUse;
        tool_use.content = BlockContent {
            tool_use_id: Some("call_1".into()),
            tool_name: Some("doc_view".into()),
            ..Default::default()
        };
        store.create_blocks(turn.id, vec![tool_use]).unwrap();

        let mut result = TurnBlock::text(Uuid::nil(), 0, "contents");
        result.block_type = BlockType::ToolResult;
        result.content = BlockContent {
            tool_use_id: Some("call_1".into()),
            ..Default::default()
        };
        let stamped = store.create_blocks(turn.id, vec![result]).unwrap();
        assert_eq!(stamped[0].sequence, 1);
    }

    #[test]
    fn update_turn_metadata_rejects_empty_model() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = store.create_turn(Turn::new_assistant_pending(chat.id, None, None)).unwrap();

        let update = TurnMetadataUpdate {
            model: Some("   ".into()),
            ..Default::default()
        };
        let err = store.update_turn_metadata(turn.id, update).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn update_turn_metadata_applies_partial_fields() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let turn = store.create_turn(Turn::new_assistant_pending(chat.id, None, None)).unwrap();

        let update = TurnMetadataUpdate {
            status: Some(TurnStatus::Complete),
            output_tokens: Some(42),
            mark_completed: true,
            ..Default::default()
        };
        let updated = store.update_turn_metadata(turn.id, update).unwrap();
        assert_eq!(updated.status, TurnStatus::Complete);
        assert_eq!(updated.output_tokens, Some(42));
        assert!(updated.completed_at.is_some());
    }

    #[test]
    fn get_path_returns_root_to_leaf() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let root = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let mid = store
            .create_turn(Turn::new_assistant_pending(chat.id, Some(root.id), None))
            .unwrap();
        let leaf = store.create_turn(Turn::new_user(chat.id, Some(mid.id))).unwrap();

        let path = store.get_path(leaf.id).unwrap();
        assert_eq!(path.iter().map(|t| t.id).collect::<Vec<_>>(), vec![root.id, mid.id, leaf.id]);
    }

    #[test]
    fn get_path_detects_runaway_depth() {
        let (_dir, store) = new_store();
        let store = store.with_max_path_depth(2);
        let chat = seed_chat(&store);
        let root = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let a = store.create_turn(Turn::new_user(chat.id, Some(root.id))).unwrap();
        let b = store.create_turn(Turn::new_user(chat.id, Some(a.id))).unwrap();
        let c = store.create_turn(Turn::new_user(chat.id, Some(b.id))).unwrap();

        let err = store.get_path(c.id).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn get_sibling_ids_includes_self_and_siblings() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let root = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let a = store
            .create_turn(Turn::new_assistant_pending(chat.id, Some(root.id), None))
            .unwrap();
        let b = store
            .create_turn(Turn::new_assistant_pending(chat.id, Some(root.id), None))
            .unwrap();

        let sibs = store.get_sibling_ids(&[a.id]).unwrap();
        let mut ids = sibs[&a.id].clone();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn get_chat_tree_is_preorder() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let root = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let a = store.create_turn(Turn::new_user(chat.id, Some(root.id))).unwrap();
        let _b = store.create_turn(Turn::new_user(chat.id, Some(root.id))).unwrap();
        let _c = store.create_turn(Turn::new_user(chat.id, Some(a.id))).unwrap();

        let tree = store.get_chat_tree(chat.id).unwrap();
        assert_eq!(tree[0].id, root.id);
        assert_eq!(tree[1].id, a.id);
    }

    #[test]
    fn paginated_turns_before_direction_walks_ancestors() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let t1 = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let t2 = store.create_turn(Turn::new_user(chat.id, Some(t1.id))).unwrap();
        let t3 = store.create_turn(Turn::new_user(chat.id, Some(t2.id))).unwrap();

        let page = store
            .get_paginated_turns(chat.id, Some(t3.id), 10, Direction::Before)
            .unwrap();
        let ids: Vec<_> = page.turns.iter().map(|t| t.turn.id).collect();
        assert_eq!(ids, vec![t1.id, t2.id, t3.id]);
        assert!(!page.has_more_before);
    }

    #[test]
    fn paginated_turns_has_more_before_when_truncated() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let t1 = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let t2 = store.create_turn(Turn::new_user(chat.id, Some(t1.id))).unwrap();
        let t3 = store.create_turn(Turn::new_user(chat.id, Some(t2.id))).unwrap();

        let page = store
            .get_paginated_turns(chat.id, Some(t3.id), 1, Direction::Before)
            .unwrap();
        assert!(page.has_more_before);
        let ids: Vec<_> = page.turns.iter().map(|t| t.turn.id).collect();
        assert_eq!(ids, vec![t2.id, t3.id]);
    }

    #[test]
    fn paginated_turns_advances_last_viewed_turn_id() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let t1 = store.create_turn(Turn::new_user(chat.id, None)).unwrap();

        store
            .get_paginated_turns(chat.id, Some(t1.id), 10, Direction::Before)
            .unwrap();

        let refreshed = store.get_chat(chat.id).unwrap();
        assert_eq!(refreshed.last_viewed_turn_id, Some(t1.id));
    }

    #[test]
    fn paginated_turns_defaults_to_latest_leaf_without_anchor() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let t1 = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let t2 = store
            .create_turn(Turn::new_assistant_pending(chat.id, Some(t1.id), None))
            .unwrap();

        let page = store
            .get_paginated_turns(chat.id, None, 10, Direction::Before)
            .unwrap();
        assert_eq!(page.turns.last().unwrap().turn.id, t2.id);
    }

    #[test]
    fn paginated_turns_both_direction_includes_anchor_once() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let t1 = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let t2 = store.create_turn(Turn::new_user(chat.id, Some(t1.id))).unwrap();
        let t3 = store.create_turn(Turn::new_user(chat.id, Some(t2.id))).unwrap();

        let page = store
            .get_paginated_turns(chat.id, Some(t2.id), 8, Direction::Both)
            .unwrap();
        let anchor_count = page.turns.iter().filter(|t| t.turn.id == t2.id).count();
        assert_eq!(anchor_count, 1);
        let ids: Vec<_> = page.turns.iter().map(|t| t.turn.id).collect();
        assert_eq!(ids, vec![t1.id, t2.id, t3.id]);
    }

    #[test]
    fn store_reopen_replays_wal() {
        let dir = tempfile::tempdir().unwrap();
        let chat_id;
        let turn_id;
        {
            let store = Store::open(dir.path()).unwrap();
            let chat = store.create_chat(Chat::new(Uuid::new_v4(), Uuid::new_v4())).unwrap();
            let turn = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
            store
                .create_blocks(turn.id, vec![TurnBlock::text(Uuid::nil(), 0, "hi")])
                .unwrap();
            chat_id = chat.id;
            turn_id = turn.id;
        }

        let reopened = Store::open(dir.path()).unwrap();
        assert!(reopened.get_chat(chat_id).is_ok());
        let turn = reopened.get_turn(turn_id).unwrap();
        assert_eq!(turn.id, turn_id);
        let blocks = reopened.get_blocks(turn_id).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text_content.as_deref(), Some("hi"));
    }

    #[test]
    fn get_turn_siblings_returns_full_objects() {
        let (_dir, store) = new_store();
        let chat = seed_chat(&store);
        let root = store.create_turn(Turn::new_user(chat.id, None)).unwrap();
        let a = store
            .create_turn(Turn::new_assistant_pending(chat.id, Some(root.id), None))
            .unwrap();
        let _b = store
            .create_turn(Turn::new_assistant_pending(chat.id, Some(root.id), None))
            .unwrap();

        let sibs = store.get_turn_siblings(a.id).unwrap();
        assert_eq!(sibs.len(), 2);
    }
}
