//! Single-identifier set for unique index keys

use std::sync::atomic::{AtomicI64, Ordering};

/// Marks an empty slot. Identifiers are never zero.
const EMPTY: i64 = 0;

/// Holds at most one identifier
#[derive(Debug, Default)]
pub struct UniqueIdSet {
    id: AtomicI64,
}

impl UniqueIdSet {
    pub fn new() -> Self {
        Self {
            id: AtomicI64::new(EMPTY),
        }
    }

    /// Stores `id`, replacing any previous owner
    pub fn add(&self, id: i64) {
        self.id.store(id, Ordering::Release);
    }

    /// Clears the slot only if it still holds `id`
    pub fn delete(&self, id: i64) -> bool {
        id != EMPTY
            && self
                .id
                .compare_exchange(id, EMPTY, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    pub fn get(&self) -> Option<i64> {
        match self.id.load(Ordering::Acquire) {
            EMPTY => None,
            id => Some(id),
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        id != EMPTY && self.id.load(Ordering::Acquire) == id
    }

    pub fn count(&self) -> usize {
        usize::from(self.get().is_some())
    }
}
