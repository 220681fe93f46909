//! Per-chat turn-creation lock.
//!
//! Grounded on the teacher's `runtime::session_lock::SessionLockMap`: a
//! `Mutex<HashMap<key, Arc<Semaphore>>>` keyed lock table, one `Semaphore(1)`
//! per key, acquired for the duration of the critical section. Keyed by
//! chat id instead of session id, and acquisition always waits rather than
//! rejecting a second waiter — two concurrent turn-creation requests against
//! the same chat should queue, not bounce, since both are legitimate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

pub struct ChatLockMap {
    locks: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
}

impl ChatLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn-creation lock for a chat. Holds it for the duration
    /// of the two `create_turn` calls (user turn + pending assistant turn)
    /// so concurrent requests against the same chat can't race on
    /// `prev_turn_id`/sibling ordering — the permit auto-releases on drop.
    pub async fn acquire(&self, chat_id: Uuid) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks.entry(chat_id).or_insert_with(|| Arc::new(Semaphore::new(1))).clone()
        };
        sem.acquire_owned().await.expect("semaphore is never closed")
    }

    /// Remove locks for chats that aren't actively held (cleanup).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

impl Default for ChatLockMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access_on_same_chat() {
        let map = ChatLockMap::new();
        let chat = Uuid::new_v4();

        let permit1 = map.acquire(chat).await;
        drop(permit1);

        let permit2 = map.acquire(chat).await;
        drop(permit2);
    }

    #[tokio::test]
    async fn different_chats_acquire_concurrently() {
        let map = Arc::new(ChatLockMap::new());
        let p1 = map.acquire(Uuid::new_v4()).await;
        let p2 = map.acquire(Uuid::new_v4()).await;
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn same_chat_serializes_concurrent_creators() {
        let map = Arc::new(ChatLockMap::new());
        let chat = Uuid::new_v4();
        let map2 = map.clone();

        let p1 = map.acquire(chat).await;

        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire(chat).await;
            42
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(p1);

        assert_eq!(handle.await.unwrap(), 42);
    }

    #[test]
    fn prune_idle_drops_unlocked_entries() {
        let map = ChatLockMap::new();
        map.locks.lock().insert(Uuid::new_v4(), Arc::new(Semaphore::new(1)));
        map.prune_idle();
        assert!(map.locks.lock().is_empty());
    }
}
