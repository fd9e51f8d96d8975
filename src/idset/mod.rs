//! Identifier set subsystem for memdex
//!
//! Each index key owns one identifier set ("bucket").
//!
//! # Variants
//!
//! - `Unique`: one atomic slot, for unique indexes
//! - `Locked`: `RwLock<HashSet>`, the default for non-unique indexes
//! - `LockFree`: hash-ordered lock-free list, for hot buckets
//!
//! Buckets are created lazily and abandoned when empty.

mod locked;
mod lockfree;
mod unique;

pub use locked::LockedIdSet;
pub use lockfree::LockFreeIdSet;
pub use unique::UniqueIdSet;

/// A concurrency-safe set of record identifiers
#[derive(Debug)]
pub enum IdSet {
    Unique(UniqueIdSet),
    Locked(LockedIdSet),
    LockFree(LockFreeIdSet),
}

impl IdSet {
    pub fn unique() -> Self {
        IdSet::Unique(UniqueIdSet::new())
    }

    pub fn locked() -> Self {
        IdSet::Locked(LockedIdSet::new())
    }

    pub fn lock_free() -> Self {
        IdSet::LockFree(LockFreeIdSet::new())
    }

    pub fn add(&self, id: i64) {
        match self {
            IdSet::Unique(set) => set.add(id),
            IdSet::Locked(set) => {
                set.add(id);
            }
            IdSet::LockFree(set) => {
                set.add(id);
            }
        }
    }

    pub fn delete(&self, id: i64) -> bool {
        match self {
            IdSet::Unique(set) => set.delete(id),
            IdSet::Locked(set) => set.delete(id),
            IdSet::LockFree(set) => set.delete(id),
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        match self {
            IdSet::Unique(set) => set.contains(id),
            IdSet::Locked(set) => set.contains(id),
            IdSet::LockFree(set) => set.contains(id),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            IdSet::Unique(set) => set.count(),
            IdSet::Locked(set) => set.count(),
            IdSet::LockFree(set) => set.count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Visits every identifier. The locked variant holds its read lock
    /// for the whole visit.
    pub fn for_each(&self, mut f: impl FnMut(i64)) {
        match self {
            IdSet::Unique(set) => {
                if let Some(id) = set.get() {
                    f(id);
                }
            }
            IdSet::Locked(set) => set.for_each(f),
            IdSet::LockFree(set) => set.for_each(f),
        }
    }

    /// Snapshot of the identifiers
    pub fn to_vec(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.count());
        self.for_each(|id| ids.push(id));
        ids
    }
}
