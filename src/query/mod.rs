//! Query subsystem for memdex
//!
//! Builds and evaluates boolean filters over records.
//!
//! # Design Principles
//!
//! - Queries are flat condition lists annotated with bracket depth
//! - Build mistakes are collected and reported together
//! - Comparator failures are errors, never panics
//! - One evaluator serves both exact filtering and index preselection

mod ast;
mod builder;
mod comparator;
mod errors;
mod evaluator;

pub use ast::{Condition, Conditions, Direction, OnIteration, Query, SortKey};
pub use builder::QueryBuilder;
pub use comparator::{
    Attribute, Comparison, FieldComparator, MapComparator, MapLike, ScalarComparator,
    SetComparator, SetLike,
};
pub use errors::{BuildError, BuildErrors, ComparatorError, ComparatorResult};
pub use evaluator::{evaluate, matches, Connective, ExactFold, Fold};
