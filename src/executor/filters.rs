//! Exact filtering of preselected candidates
//!
//! Every candidate is tested against the full bracket-fold. The first
//! comparator error stops the scan; so does cancellation.

use std::sync::Arc;

use super::cancel::CancellationToken;
use super::errors::{ExecutorError, ExecutorResult};
use crate::query::{matches, Query};

/// Evaluates a query's conditions against candidate records
pub struct PredicateFilter<'a, R> {
    query: &'a Query<R>,
    token: &'a CancellationToken,
}

impl<'a, R> PredicateFilter<'a, R> {
    pub fn new(query: &'a Query<R>, token: &'a CancellationToken) -> Self {
        Self { query, token }
    }

    /// Checks if a record matches every condition
    pub fn matches(&self, record: &R) -> ExecutorResult<bool> {
        matches(self.query.conditions(), record).map_err(ExecutorError::execution_failed)
    }

    /// Scans `candidates`, handing each match to `on_match` after the
    /// query's per-match callback. Returns the number of matches.
    pub fn run(
        &self,
        candidates: impl IntoIterator<Item = Arc<R>>,
        mut on_match: impl FnMut(Arc<R>),
    ) -> ExecutorResult<usize> {
        let mut total = 0;
        for record in candidates {
            if self.token.is_cancelled() {
                return Err(ExecutorError::cancelled());
            }
            if !self.matches(&record)? {
                continue;
            }
            self.query.notify(&record);
            total += 1;
            on_match(record);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::executor::ExecutorErrorCode;
    use crate::query::{Attribute, QueryBuilder};
    use crate::schema::{Record, Schema};

    #[derive(Debug)]
    struct Task {
        id: i64,
        priority: i64,
        title: String,
    }

    impl Record for Task {
        fn id(&self) -> i64 {
            self.id
        }
    }

    fn tasks() -> Vec<Arc<Task>> {
        (1..=6)
            .map(|id| {
                Arc::new(Task {
                    id,
                    priority: id % 3,
                    title: format!("task-{}", id),
                })
            })
            .collect()
    }

    fn attrs() -> (Attribute<Task, i64>, Attribute<Task, String>) {
        let schema = Schema::new("tasks");
        (
            Attribute::new(schema.field("priority"), |t: &Task| &t.priority),
            Attribute::new(schema.field("title"), |t: &Task| &t.title),
        )
    }

    #[test]
    fn test_run_counts_and_notifies() {
        let (priority, _) = attrs();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let query = QueryBuilder::new()
            .filter(priority.eq(0))
            .on_iteration(move |_: &Task| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let token = CancellationToken::new();
        let mut matched = Vec::new();
        let total = PredicateFilter::new(&query, &token)
            .run(tasks(), |t| matched.push(t.id))
            .unwrap();

        assert_eq!(total, 2);
        assert_eq!(matched, vec![3, 6]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_comparator_error_stops_scan() {
        let (priority, _) = attrs();
        let query = QueryBuilder::new().filter(priority.like("x")).build();
        let token = CancellationToken::new();

        let err = PredicateFilter::new(&query, &token)
            .run(tasks(), |_| panic!("nothing matches"))
            .unwrap_err();
        assert_eq!(err.code(), ExecutorErrorCode::ExecutionFailed);
    }

    #[test]
    fn test_cancellation_discards_scan() {
        let (_, title) = attrs();
        let query = QueryBuilder::new().filter(title.like("task")).build();
        let token = CancellationToken::new();
        token.cancel();

        let err = PredicateFilter::new(&query, &token)
            .run(tasks(), |_| {})
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
