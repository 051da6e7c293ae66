//! Per-user concurrency slot accounting.
//!
//! A slot is held from VALIDATED through any terminal state and released
//! exactly once on the terminal transition. The count is a single atomically
//! guarded counter per user, never derived by counting open orders, so bursts
//! of parallel validations cannot race it past the limit.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::error;
use types::UserId;

#[derive(Default)]
pub struct SlotBook {
    held: DashMap<UserId, Arc<AtomicU32>>,
}

impl SlotBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, user: &UserId) -> Arc<AtomicU32> {
        self.held
            .entry(user.clone())
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone()
    }

    /// Acquire one slot if the user is under `max`. Lock-free CAS loop.
    pub fn try_acquire(&self, user: &UserId, max: u32) -> bool {
        let counter = self.counter(user);
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current >= max {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Release one slot. Underflow indicates a double release and is a bug;
    /// the counter is left at zero and the incident logged.
    pub fn release(&self, user: &UserId) {
        let counter = self.counter(user);
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current == 0 {
                error!(user = %user, "slot release with zero held; double release?");
                return;
            }
            match counter.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn held(&self, user: &UserId) -> u32 {
        self.held
            .get(user)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}
