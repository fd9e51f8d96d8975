//! The index contract

use std::fmt;
use std::sync::Arc;

use crate::idset::IdSet;
use crate::query::{ComparatorError, ComparatorResult, Condition};
use crate::schema::{Field, ScalarValue};

/// Relative cost of serving a condition from an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Weight {
    /// Native access path (hash lookup, B-tree range)
    Low,
    /// Supported but not the structure's strength
    Medium,
    /// Full key scan with a per-key comparator check
    High,
}

/// Index family, for logs and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Hash,
    BTree,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Hash => "hash",
            IndexKind::BTree => "btree",
        }
    }
}

/// Bucket implementation for non-unique indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketKind {
    #[default]
    Locked,
    LockFree,
}

/// Per-index options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexOptions {
    /// At most one record per key; a later insert takes the key over
    pub unique: bool,
    pub buckets: BucketKind,
}

impl IndexOptions {
    pub fn unique() -> Self {
        Self {
            unique: true,
            buckets: BucketKind::Locked,
        }
    }

    pub fn lock_free() -> Self {
        Self {
            unique: false,
            buckets: BucketKind::LockFree,
        }
    }

    pub(crate) fn new_bucket(&self) -> IdSet {
        if self.unique {
            return IdSet::unique();
        }
        match self.buckets {
            BucketKind::Locked => IdSet::locked(),
            BucketKind::LockFree => IdSet::lock_free(),
        }
    }
}

/// Candidate buckets for one condition.
///
/// Buckets come from distinct keys of one index, so no identifier appears
/// in more than one of them.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub count: usize,
    pub sets: Vec<Arc<IdSet>>,
    pub unique: bool,
}

impl Selection {
    pub(crate) fn new(unique: bool) -> Self {
        Self {
            count: 0,
            sets: Vec::new(),
            unique,
        }
    }

    /// Adds a bucket, skipping empty ones
    pub(crate) fn push(&mut self, set: Arc<IdSet>) {
        let count = set.count();
        if count > 0 {
            self.count += count;
            self.sets.push(set);
        }
    }
}

/// Casts operand `i` of `condition` to the index key type
pub(crate) fn operand_key<R, K: ScalarValue>(condition: &Condition<R>, i: usize) -> ComparatorResult<K> {
    let comparator = condition.comparator();
    let value = comparator
        .value_at(i)
        .ok_or(ComparatorError::MissingOperand(comparator.kind()))?;
    Ok(K::from_value(value)?)
}

/// Maps a key derived from each record to the bucket of identifiers with
/// that key
pub trait Index<R>: Send + Sync + fmt::Debug {
    fn field(&self) -> &Field;

    fn kind(&self) -> IndexKind;

    fn is_unique(&self) -> bool;

    /// Number of distinct keys
    fn key_count(&self) -> usize;

    fn insert(&self, record: &R);

    fn delete(&self, record: &R);

    /// Moves the record between buckets when its key changed
    fn update(&self, old: &R, new: &R);

    /// Cost of serving `condition`, or `None` when this index cannot
    fn weight(&self, condition: &Condition<R>) -> Option<Weight>;

    /// Buckets whose identifiers may satisfy `condition`, negation included
    fn select(&self, condition: &Condition<R>) -> ComparatorResult<Selection>;
}
