//! Shared application state handed to every handler.
//!
//! Grounded on the teacher's `state.rs` `AppState` — one struct built once
//! at startup and cloned cheaply (every field is an `Arc` or `Copy`) into
//! axum's handler extractors. This gateway only needs the slice of the
//! teacher's state that has a turn-engine counterpart: no sessions,
//! skills, memory, or node registry here.

use std::sync::Arc;

use dw_domain::config::Config;
use dw_engine::{CancelRegistry, StreamRegistry, TurnExecutor};
use dw_providers::registry::ProviderRegistry;
use dw_store::Store;

use crate::chat_lock::ChatLockMap;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub providers: Arc<ProviderRegistry>,
    pub hubs: Arc<StreamRegistry>,
    pub cancels: Arc<CancelRegistry>,
    pub executor: Arc<TurnExecutor>,
    /// Serializes `POST .../turns` against the same chat so two concurrent
    /// requests can't race on `prev_turn_id`/sibling ordering.
    pub chat_locks: Arc<ChatLockMap>,
    /// SHA-256 of the configured bearer token. `None` means auth is
    /// disabled (no `ADMIN_CONFIG.api_token_env` value set) — local/dev use.
    pub api_token_hash: Option<Vec<u8>>,
}
