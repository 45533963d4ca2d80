use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use affirm_types::{IdentityId, Via};

type SlotKey = (IdentityId, Via);

/// Per-address lock table.
///
/// Mutations on the same `(identity, via)` slot are serialized; different
/// slots proceed in parallel. Reads never take these locks.
#[derive(Default)]
pub struct AddressLocks {
    slots: Mutex<HashMap<SlotKey, Arc<Mutex<()>>>>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for a slot.
    fn slot_lock(&self, identity: &IdentityId, via: Via) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry((identity.clone(), via))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the slot's lock.
    ///
    /// Poisoning is ignored; the mutex guards no data. The slot's entry is
    /// dropped afterwards unless another caller holds or waits on it.
    pub fn with_slot<R>(&self, identity: &IdentityId, via: Via, f: impl FnOnce() -> R) -> R {
        let lock = self.slot_lock(identity, via);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(identity, via, lock);
        result
    }

    fn release(&self, identity: &IdentityId, via: Via, lock: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        // Clones only happen under the table lock, so a count of one is final.
        let key = (identity.clone(), via);
        if slots.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            slots.remove(&key);
        }
    }

    /// Number of slots currently tracked.
    pub fn tracked_slots(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop locks no caller is holding or waiting on.
    ///
    /// Only entries left behind by a panicking closure need this.
    pub fn cleanup(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
