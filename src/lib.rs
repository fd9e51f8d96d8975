//! memdex - An in-memory, indexed record store
//!
//! Records live in a canonical identifier map. Hash and B-tree indexes
//! narrow a query to a candidate superset, a bracket-fold evaluator
//! filters the candidates exactly, and the executor sorts and paginates
//! the matches.

pub mod executor;
pub mod idset;
pub mod index;
pub mod observability;
pub mod query;
pub mod schema;
pub mod store;
