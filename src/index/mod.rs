//! Index subsystem for memdex
//!
//! Indexes are derived, in-memory state maintained on every write.
//!
//! # Design Principles
//!
//! - Derived state: indexes mirror the record map, never the source of truth
//! - Cost-based: each condition is served by its cheapest applicable index
//! - Sound: a selection is always a superset of the true matches
//!
//! # Invariants
//!
//! - Buckets are created lazily and never removed
//! - One record sits in exactly one bucket per index
//! - Updates that keep the key touch no bucket

mod btree;
mod hash;
mod manager;
mod tree;
mod types;

pub use btree::{natural_less, scalar_less, BTree, Less, MIN_MAX_CHILDREN};
pub use hash::HashIndex;
pub use manager::{ApproximateFold, Candidates, IndexSet};
pub use tree::BTreeIndex;
pub use types::{BucketKind, Index, IndexKind, IndexOptions, Selection, Weight};
