//! Per-turn cancellation tokens.
//!
//! Grounded on `gateway/runtime/cancel.rs`'s `CancelToken`/`CancelMap`: an
//! `Arc<AtomicBool>` the runtime loop polls at a handful of checkpoints,
//! registered in a map keyed by the running unit of work. This engine has
//! no equivalent of the teacher's cascading cancel groups (no child-turn
//! fan-out), so only the token and a flat per-turn map are ported.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the cancel token for every turn currently executing.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl CancelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, turn_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(turn_id, token.clone());
        token
    }

    /// Requests cancellation of a running turn. Returns `false` if the turn
    /// is not currently executing (already terminal, or unknown).
    pub fn cancel(&self, turn_id: Uuid) -> bool {
        if let Some(token) = self.tokens.lock().get(&turn_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, turn_id: Uuid) {
        self.tokens.lock().remove(&turn_id);
    }

    pub fn is_running(&self, turn_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&turn_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn registry_register_and_cancel() {
        let reg = CancelRegistry::new();
        let turn_id = Uuid::new_v4();
        let token = reg.register(turn_id);
        assert!(reg.is_running(turn_id));
        assert!(reg.cancel(turn_id));
        assert!(token.is_cancelled());
        reg.remove(turn_id);
        assert!(!reg.is_running(turn_id));
    }

    #[test]
    fn cancel_unknown_turn_returns_false() {
        let reg = CancelRegistry::new();
        assert!(!reg.cancel(Uuid::new_v4()));
    }
}
