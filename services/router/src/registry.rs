//! Mission registry: concurrent lookup tables for in-flight missions.
//!
//! Three indexes: missions by id, mission ids by order id (O(1) confirmation
//! correlation), and the (signal, user) uniqueness guard enforcing at most
//! one non-terminal mission per pair. Terminal entries are retained for a
//! window so re-delivered confirmations stay idempotent, then evicted by the
//! cleanup task.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use types::{FireOrder, Mission, MissionId, MissionState, OrderId, Signal, UserId};

/// Everything the router tracks for one mission.
pub struct MissionEntry {
    pub mission: Mission,
    pub signal: Arc<Signal>,
    pub order: Option<FireOrder>,
    /// Set at VALIDATED, cleared exactly once when the slot is released.
    pub slot_held: bool,
    /// Set on terminal transition; drives retention eviction.
    pub terminal_at: Option<Instant>,
}

#[derive(Default)]
pub struct MissionRegistry {
    missions: DashMap<MissionId, MissionEntry>,
    by_order: DashMap<OrderId, MissionId>,
    by_pair: DashMap<(String, UserId), MissionId>,
}

impl MissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a PENDING mission for (signal, user), enforcing the one
    /// non-terminal mission per pair invariant. Returns `None` when a live
    /// mission already exists.
    pub fn create(&self, signal: Arc<Signal>, mission: Mission) -> Option<MissionId> {
        let pair = (signal.signal_id.clone(), mission.user_id.clone());
        if let Some(existing) = self.by_pair.get(&pair) {
            debug!(
                signal = signal.signal_id.as_str(),
                user = %mission.user_id,
                existing = %*existing,
                "live mission already exists for pair"
            );
            return None;
        }

        let id = mission.mission_id;
        self.by_pair.insert(pair, id);
        self.missions.insert(
            id,
            MissionEntry {
                mission,
                signal,
                order: None,
                slot_held: false,
                terminal_at: None,
            },
        );
        Some(id)
    }

    /// Run `f` with exclusive access to a mission entry.
    pub fn update<R>(&self, id: MissionId, f: impl FnOnce(&mut MissionEntry) -> R) -> Option<R> {
        self.missions.get_mut(&id).map(|mut entry| f(&mut entry))
    }

    /// Read-only peek at a mission's current state.
    pub fn state_of(&self, id: MissionId) -> Option<MissionState> {
        self.missions.get(&id).map(|e| e.mission.state)
    }

    /// Register the dispatched order for confirmation correlation.
    pub fn bind_order(&self, id: MissionId, order: FireOrder) {
        self.by_order.insert(order.order_id, id);
        self.update(id, |entry| entry.order = Some(order));
    }

    pub fn mission_for_order(&self, order_id: OrderId) -> Option<MissionId> {
        self.by_order.get(&order_id).map(|id| *id)
    }

    /// Bookkeeping after a terminal transition: stamp the eviction clock and
    /// free the pair for a future re-signal.
    pub fn note_terminal(&self, id: MissionId) {
        let pair = self.update(id, |entry| {
            if entry.terminal_at.is_none() {
                entry.terminal_at = Some(Instant::now());
            }
            (entry.signal.signal_id.clone(), entry.mission.user_id.clone())
        });
        if let Some(pair) = pair {
            // Only drop the pair guard if it still points at this mission.
            if self.by_pair.get(&pair).map(|v| *v) == Some(id) {
                self.by_pair.remove(&pair);
            }
        }
    }

    /// Evict terminal missions older than the retention window. Returns how
    /// many were removed.
    pub fn cleanup(&self, retention: Duration) -> usize {
        let mut evict = Vec::new();
        for entry in self.missions.iter() {
            if let Some(at) = entry.terminal_at {
                if at.elapsed() >= retention {
                    evict.push((*entry.key(), entry.order.as_ref().map(|o| o.order_id)));
                }
            }
        }
        let evicted = evict.len();
        for (mission_id, order_id) in evict {
            self.missions.remove(&mission_id);
            if let Some(order_id) = order_id {
                self.by_order.remove(&order_id);
            }
        }
        evicted
    }

    /// Snapshot of one mission for observability and tests.
    pub fn mission(&self, id: MissionId) -> Option<Mission> {
        self.missions.get(&id).map(|e| e.mission.clone())
    }

    /// The order bound to a mission, if it reached dispatch.
    pub fn order(&self, id: MissionId) -> Option<FireOrder> {
        self.missions.get(&id).and_then(|e| e.order.clone())
    }

    pub fn mission_ids(&self) -> Vec<MissionId> {
        self.missions.iter().map(|e| *e.key()).collect()
    }

    pub fn live_missions(&self) -> usize {
        self.missions
            .iter()
            .filter(|e| !e.mission.state.is_terminal())
            .count()
    }

    pub fn total_missions(&self) -> usize {
        self.missions.len()
    }
}
