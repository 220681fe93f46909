//! Stream Hub — the per-turn in-memory broadcast point.
//!
//! Grounded on `gateway/runtime/runs.rs`'s per-run `broadcast::Sender`
//! channel map: one channel per live unit of work, lagging receivers
//! dropped rather than blocking the publisher. Generalized here with an
//! explicit event-log ring buffer and a catch-up mutex, since (unlike the
//! run store's single in-memory `Run` record) block content must survive a
//! persist-then-clear race against a reconnecting client.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use dw_domain::error::Result;

use crate::event::TurnEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubStatus {
    Active,
    Completed,
    Errored,
}

/// One buffered event with its hub-assigned monotonic id.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub seq: u64,
    pub event: TurnEvent,
}

struct HubInner {
    buffer: VecDeque<Envelope>,
    next_seq: u64,
    status: HubStatus,
    last_activity: Instant,
}

/// A snapshot of hub state for a late-joining client deciding how to catch up.
#[derive(Debug, Clone, Copy)]
pub struct HubSnapshot {
    pub status: HubStatus,
    pub latest_seq: u64,
}

pub struct StreamHub {
    turn_id: Uuid,
    buffer_capacity: usize,
    inner: Mutex<HubInner>,
    sender: broadcast::Sender<Envelope>,
}

impl StreamHub {
    pub fn new(turn_id: Uuid, buffer_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_capacity.max(16));
        Self {
            turn_id,
            buffer_capacity,
            inner: Mutex::new(HubInner {
                buffer: VecDeque::with_capacity(buffer_capacity.min(256)),
                next_seq: 1,
                status: HubStatus::Active,
                last_activity: Instant::now(),
            }),
            sender,
        }
    }

    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// Append to the rolling buffer and fan out to every subscribed client,
    /// both under the same lock `catch_up` takes for its tail-read +
    /// subscribe. A publisher is never blocked by a slow subscriber —
    /// `broadcast::Sender::send` only fails when there are no receivers,
    /// which is not an error here — so holding the lock across the send is
    /// cheap. Without this, a concurrent `catch_up` could either miss the
    /// event (subscribed before the buffer push, recv's before the send) or
    /// double-deliver it (buffer already shows it, then the receiver also
    /// gets it), depending on how the two unlocked steps interleaved.
    pub fn publish(&self, event: TurnEvent) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.last_activity = Instant::now();
        let envelope = Envelope { seq, event };
        inner.buffer.push_back(envelope.clone());
        while inner.buffer.len() > self.buffer_capacity {
            inner.buffer.pop_front();
        }
        let _ = self.sender.send(envelope);
        seq
    }

    /// Run `persist` (a synchronous store write) under the catch-up mutex,
    /// then — only on success — drop buffered entries belonging to
    /// `block_index`. On failure the buffer is left untouched and the error
    /// propagates so the executor can emit `turn_error`.
    pub fn persist_and_clear(
        &self,
        block_index: u32,
        persist: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        persist()?;
        inner.buffer.retain(|e| !e.event.belongs_to_block(block_index));
        inner.last_activity = Instant::now();
        Ok(())
    }

    /// Events buffered with `seq > last_seen`, oldest first — the live tail
    /// a reconnecting client hasn't seen yet.
    pub fn events_since(&self, last_seen: u64) -> Vec<Envelope> {
        let inner = self.inner.lock();
        inner
            .buffer
            .iter()
            .filter(|e| e.seq > last_seen)
            .cloned()
            .collect()
    }

    /// Gather the persisted-blocks read, the buffer tail, and a live
    /// subscription, all under the same guard `persist_and_clear` uses. The
    /// subscription is taken in this same critical section so an event
    /// published between the tail snapshot and the caller's first `recv()`
    /// is never lost: it either lands in `tail` (published before this lock
    /// was taken) or is delivered to the returned receiver (published after
    /// — receivers see every send from the moment `subscribe()` runs while
    /// the lock is held, so no publish can land in the gap between the two).
    pub fn catch_up(
        &self,
        last_seen: u64,
        read_persisted: impl FnOnce() -> Vec<dw_domain::block::TurnBlock>,
    ) -> (Vec<dw_domain::block::TurnBlock>, Vec<Envelope>, broadcast::Receiver<Envelope>) {
        let inner = self.inner.lock();
        let persisted = read_persisted();
        let tail = inner
            .buffer
            .iter()
            .filter(|e| e.seq > last_seen)
            .cloned()
            .collect();
        let receiver = self.sender.subscribe();
        (persisted, tail, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let inner = self.inner.lock();
        HubSnapshot {
            status: inner.status,
            latest_seq: inner.next_seq.saturating_sub(1),
        }
    }

    pub fn mark_status(&self, status: HubStatus) {
        let mut inner = self.inner.lock();
        inner.status = status;
        inner.last_activity = Instant::now();
    }

    /// Whether this hub is eligible for sweeping: terminal and idle past
    /// `retention`.
    pub fn is_evictable(&self, retention: std::time::Duration) -> bool {
        let inner = self.inner.lock();
        inner.status != HubStatus::Active && inner.last_activity.elapsed() >= retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> StreamHub {
        StreamHub::new(Uuid::new_v4(), 10)
    }

    #[test]
    fn publish_assigns_monotonic_seq() {
        let h = hub();
        let a = h.publish(TurnEvent::BlockStop { block_index: 0 });
        let b = h.publish(TurnEvent::BlockStop { block_index: 1 });
        assert!(b > a);
    }

    #[test]
    fn buffer_respects_capacity() {
        let h = StreamHub::new(Uuid::new_v4(), 3);
        for i in 0..10u32 {
            h.publish(TurnEvent::BlockStop { block_index: i });
        }
        let all = h.events_since(0);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn events_since_excludes_already_seen() {
        let h = hub();
        h.publish(TurnEvent::BlockStop { block_index: 0 });
        let second = h.publish(TurnEvent::BlockStop { block_index: 1 });
        let tail = h.events_since(second - 1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, second);
    }

    #[test]
    fn catch_up_gathers_persisted_and_tail_together() {
        let h = hub();
        h.publish(TurnEvent::BlockStart { block_index: 0, block_type: None });
        let seq = h.publish(TurnEvent::BlockStop { block_index: 0 });
        let (persisted, tail, _rx) = h.catch_up(seq, || vec![]);
        assert!(persisted.is_empty());
        assert!(tail.is_empty());
    }

    #[test]
    fn catch_up_subscription_sees_events_published_right_after() {
        let h = hub();
        let seq = h.publish(TurnEvent::BlockStop { block_index: 0 });
        let (_persisted, tail, mut rx) = h.catch_up(seq, || vec![]);
        assert!(tail.is_empty());
        h.publish(TurnEvent::BlockStop { block_index: 1 });
        let envelope = rx.try_recv().expect("subscriber should see the post-catch-up publish");
        assert_eq!(envelope.seq, seq + 1);
    }

    #[test]
    fn persist_and_clear_drops_only_matching_block_events_on_success() {
        let h = hub();
        h.publish(TurnEvent::BlockStart { block_index: 0, block_type: None });
        h.publish(TurnEvent::BlockStop { block_index: 0 });
        h.publish(TurnEvent::BlockStart { block_index: 1, block_type: None });

        h.persist_and_clear(0, || Ok(())).unwrap();

        let remaining = h.events_since(0);
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].event.belongs_to_block(1));
    }

    #[test]
    fn persist_and_clear_keeps_buffer_on_failure() {
        let h = hub();
        h.publish(TurnEvent::BlockStop { block_index: 0 });
        let result = h.persist_and_clear(0, || Err(dw_domain::error::Error::Persistence("boom".into())));
        assert!(result.is_err());
        assert_eq!(h.events_since(0).len(), 1);
    }

    #[test]
    fn evictable_only_when_terminal_and_idle() {
        let h = hub();
        assert!(!h.is_evictable(std::time::Duration::from_secs(0)));
        h.mark_status(HubStatus::Completed);
        assert!(h.is_evictable(std::time::Duration::from_secs(0)));
    }
}
