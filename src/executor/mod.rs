//! Query Executor subsystem for memdex
//!
//! # Execution Flow (strict order)
//!
//! 1. Fail fast on builder errors
//! 2. Preselect a candidate superset through indexes
//! 3. Filter candidates exactly, checking cancellation per candidate
//! 4. Count every match and push it into the sort heap
//! 5. Hand out the `offset`/`limit` window lazily
//!
//! # Invariants
//!
//! - Deterministic order: sort keys, then ascending identifier
//! - The reported total ignores limit and offset
//! - Errors and cancellation discard partial results

mod cancel;
mod errors;
mod executor;
mod filters;
mod result;
mod sorter;

pub use cancel::CancellationToken;
pub use errors::{ExecutorError, ExecutorErrorCode, ExecutorResult, Severity as ErrorSeverity};
pub use executor::QueryExecutor;
pub use filters::PredicateFilter;
pub use result::{window, QueryIterator, QueryOutput};
pub use sorter::ResultSorter;
