//! Store subsystem for memdex
//!
//! Owns the canonical identifier to record map and the indexes derived
//! from it.
//!
//! # Design Principles
//!
//! - The record map is the source of truth; indexes follow every write
//! - Preselection is sound: it never drops a record that matches
//! - Explicit collaborators: logger and configuration are passed in
//!
//! # Invariants
//!
//! - Identifiers are non-zero and unique within a store
//! - A failed insert leaves the store unchanged
//! - Upserts that keep an index key touch no bucket of that index

mod config;
mod errors;
mod namespace;

pub use config::StoreConfig;
pub use errors::{ConfigError, ConfigResult, StoreError, StoreResult};
pub use namespace::{Preselection, Store, UpsertOutcome};
