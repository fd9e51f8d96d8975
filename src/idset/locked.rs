//! Reader-writer locked identifier set

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// Multi-identifier set behind a `RwLock`.
///
/// Iteration goes through [`LockedIdSet::read`], which hands the read lock
/// to the caller for as long as they iterate.
#[derive(Debug, Default)]
pub struct LockedIdSet {
    ids: RwLock<HashSet<i64>>,
}

impl LockedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: i64) -> bool {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    pub fn delete(&self, id: i64) -> bool {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.read().contains(&id)
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Holds the read lock until the guard drops
    pub fn read(&self) -> RwLockReadGuard<'_, HashSet<i64>> {
        self.ids.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn for_each(&self, mut f: impl FnMut(i64)) {
        let ids = self.read();
        for &id in ids.iter() {
            f(id);
        }
    }
}
