//! Stream Registry — process-wide `turn_id -> StreamHub` map with a
//! background sweeper.
//!
//! Grounded on the teacher's `event_channels: RwLock<HashMap<Uuid,
//! broadcast::Sender<RunEvent>>>` in `gateway/runtime/runs.rs`: a single map
//! lock for lookup/insert/delete, and `cleanup_channel` for tearing down a
//! completed run's channel. Generalized into a standalone registry (rather
//! than living inside the store) with its own sweep loop, since hub
//! lifetime here is independent of turn persistence — hubs expire, turns
//! never do.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dw_domain::trace::TraceEvent;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::hub::StreamHub;

pub struct StreamRegistry {
    hubs: RwLock<HashMap<Uuid, Arc<StreamHub>>>,
    buffer_capacity: usize,
}

impl StreamRegistry {
    pub fn new(buffer_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            hubs: RwLock::new(HashMap::new()),
            buffer_capacity,
        })
    }

    /// Idempotent: a second caller for the same turn gets the existing hub.
    pub fn get_or_create(&self, turn_id: Uuid) -> Arc<StreamHub> {
        if let Some(hub) = self.hubs.read().get(&turn_id) {
            return hub.clone();
        }
        let mut hubs = self.hubs.write();
        let created = !hubs.contains_key(&turn_id);
        let hub = hubs
            .entry(turn_id)
            .or_insert_with(|| Arc::new(StreamHub::new(turn_id, self.buffer_capacity)))
            .clone();
        if created {
            TraceEvent::HubCreated {
                turn_id: turn_id.to_string(),
            }
            .emit();
        }
        hub
    }

    pub fn get(&self, turn_id: Uuid) -> Option<Arc<StreamHub>> {
        self.hubs.read().get(&turn_id).cloned()
    }

    pub fn remove(&self, turn_id: Uuid) {
        if self.hubs.write().remove(&turn_id).is_some() {
            TraceEvent::HubEvicted {
                turn_id: turn_id.to_string(),
                reason: "removed".into(),
            }
            .emit();
        }
    }

    pub fn len(&self) -> usize {
        self.hubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.read().is_empty()
    }

    /// One sweep pass: evict every hub that is terminal and idle past
    /// `retention`. Returns the number evicted.
    pub fn sweep_once(&self, retention: Duration) -> usize {
        let to_evict: Vec<Uuid> = self
            .hubs
            .read()
            .iter()
            .filter(|(_, hub)| hub.is_evictable(retention))
            .map(|(id, _)| *id)
            .collect();
        let count = to_evict.len();
        if count > 0 {
            let mut hubs = self.hubs.write();
            for id in &to_evict {
                hubs.remove(id);
            }
            drop(hubs);
            for id in to_evict {
                TraceEvent::HubEvicted {
                    turn_id: id.to_string(),
                    reason: "sweep_idle".into(),
                }
                .emit();
            }
        }
        count
    }

    /// Spawn the background sweeper. Runs until the returned handle is
    /// dropped or aborted.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        retention: Duration,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = registry.sweep_once(retention);
                if evicted > 0 {
                    tracing::debug!(evicted, "stream registry sweep evicted idle hubs");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubStatus;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = StreamRegistry::new(100);
        let turn_id = Uuid::new_v4();
        let a = registry.get_or_create(turn_id);
        let b = registry.get_or_create(turn_id);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn sweep_evicts_only_terminal_idle_hubs() {
        let registry = StreamRegistry::new(100);
        let active = Uuid::new_v4();
        let terminal = Uuid::new_v4();
        registry.get_or_create(active);
        let terminal_hub = registry.get_or_create(terminal);
        terminal_hub.mark_status(HubStatus::Completed);

        let evicted = registry.sweep_once(Duration::from_secs(0));
        assert_eq!(evicted, 1);
        assert!(registry.get(active).is_some());
        assert!(registry.get(terminal).is_none());
    }

    #[test]
    fn remove_drops_hub_immediately() {
        let registry = StreamRegistry::new(100);
        let turn_id = Uuid::new_v4();
        registry.get_or_create(turn_id);
        registry.remove(turn_id);
        assert!(registry.get(turn_id).is_none());
    }
}
