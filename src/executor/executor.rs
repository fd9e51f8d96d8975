//! Query executor for memdex
//!
//! Execution flow (strict order):
//! 1. Reject queries carrying builder errors
//! 2. Preselect candidates through the store's indexes
//! 3. Check cancellation, then filter each candidate exactly
//! 4. Invoke the per-match callback and count the match
//! 5. Push the match into the sort heap
//! 6. Expose the `offset`/`limit` window lazily

use std::sync::Arc;

use super::cancel::CancellationToken;
use super::errors::{ExecutorError, ExecutorResult};
use super::filters::PredicateFilter;
use super::result::{QueryIterator, QueryOutput};
use super::sorter::ResultSorter;
use crate::observability::{log_event, Event};
use crate::query::Query;
use crate::schema::Record;
use crate::store::Store;

/// Runs queries against one store. Each call is single-threaded;
/// concurrent executors share the store's locks.
pub struct QueryExecutor<'a, R> {
    store: &'a Store<R>,
}

impl<'a, R: Record> QueryExecutor<'a, R> {
    pub fn new(store: &'a Store<R>) -> Self {
        Self { store }
    }

    /// Executes `query`, returning the requested page and the total
    /// number of matches.
    ///
    /// On error or cancellation no partial result is returned.
    pub fn execute(
        &self,
        query: &Query<R>,
        token: &CancellationToken,
    ) -> ExecutorResult<QueryOutput<R>> {
        let mut sorter = ResultSorter::new(query);
        let total = self.scan(query, token, |record| sorter.push(record))?;

        Ok(QueryOutput {
            iterator: QueryIterator::new(sorter, query.offset(), query.limit()),
            total,
        })
    }

    /// Counts the matches of `query` without ordering them
    pub fn count(&self, query: &Query<R>, token: &CancellationToken) -> ExecutorResult<usize> {
        self.scan(query, token, |_| {})
    }

    fn scan(
        &self,
        query: &Query<R>,
        token: &CancellationToken,
        on_match: impl FnMut(Arc<R>),
    ) -> ExecutorResult<usize> {
        let metrics = self.store.metrics();
        let logger = self.store.logger();

        if let Some(errors) = query.error() {
            metrics.increment_queries_rejected();
            log_event(
                logger,
                Event::QueryRejected,
                &[
                    ("errors", errors.len().to_string()),
                    ("reason", errors.to_string()),
                ],
            );
            return Err(ExecutorError::query_invalid(errors.clone()));
        }

        let result = self
            .store
            .preselect(query.conditions())
            .map_err(ExecutorError::execution_failed)
            .and_then(|preselection| {
                let candidates = preselection.records.len();
                let used_index = preselection.used_index;
                PredicateFilter::new(query, token)
                    .run(preselection.records, on_match)
                    .map(|total| (total, candidates, used_index))
            });

        match result {
            Ok((total, candidates, used_index)) => {
                metrics.increment_queries_executed();
                log_event(
                    logger,
                    Event::QueryComplete,
                    &[
                        ("candidates", candidates.to_string()),
                        ("total", total.to_string()),
                        ("used_index", used_index.to_string()),
                    ],
                );
                Ok(total)
            }
            Err(err) if err.is_cancelled() => {
                metrics.increment_queries_cancelled();
                log_event(logger, Event::QueryCancelled, &[]);
                Err(err)
            }
            Err(err) => {
                metrics.increment_queries_failed();
                log_event(
                    logger,
                    Event::QueryFailed,
                    &[
                        ("code", err.code().code().to_string()),
                        ("reason", err.message().to_string()),
                    ],
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::executor::ExecutorErrorCode;
    use crate::index::IndexOptions;
    use crate::observability::{Logger, Severity};
    use crate::query::{Attribute, QueryBuilder};
    use crate::schema::Schema;
    use crate::store::StoreConfig;

    #[derive(Debug, Clone)]
    struct User {
        id: i64,
        age: i64,
        email: String,
    }

    impl Record for User {
        fn id(&self) -> i64 {
            self.id
        }
    }

    fn age_key(u: &User) -> i64 {
        u.age
    }

    struct Fixture {
        store: Store<User>,
        buffer: crate::observability::LogBuffer,
        age: Attribute<User, i64>,
        email: Attribute<User, String>,
    }

    fn fixture() -> Fixture {
        let (logger, buffer) = Logger::buffered(Severity::Trace);
        let store = Store::new(StoreConfig::default(), Arc::new(logger)).unwrap();
        let schema = Schema::new("users");
        let age_field = schema.field("age");
        let email_field = schema.field("email");
        store.add_btree_index(
            age_field.clone(),
            age_key as fn(&User) -> i64,
            IndexOptions::default(),
        );

        for id in 1..=5 {
            store
                .insert(User {
                    id,
                    age: 17 + id,
                    email: format!("user{}@example.com", id),
                })
                .unwrap();
        }

        Fixture {
            store,
            buffer,
            age: Attribute::new(age_field, |u: &User| &u.age),
            email: Attribute::new(email_field, |u: &User| &u.email),
        }
    }

    fn ids(output: QueryOutput<User>) -> Vec<i64> {
        output.iterator.map(|u| u.id).collect()
    }

    fn events(buffer: &crate::observability::LogBuffer) -> Vec<String> {
        buffer
            .lines()
            .iter()
            .filter_map(|l| l["event"].as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_execute_sorted_page() {
        let f = fixture();
        let query = QueryBuilder::new()
            .filter(f.age.ge(19))
            .sort(f.age.desc())
            .offset(1)
            .limit(2)
            .build();

        let output = QueryExecutor::new(&f.store)
            .execute(&query, &CancellationToken::new())
            .unwrap();
        assert_eq!(output.total, 4);
        assert_eq!(output.iterator.size(), 2);
        assert_eq!(ids(output), vec![4, 3]);
    }

    #[test]
    fn test_count_matches_execute_total() {
        let f = fixture();
        let query = QueryBuilder::new()
            .filter(f.email.like("user"))
            .limit(1)
            .build();
        let executor = QueryExecutor::new(&f.store);
        let token = CancellationToken::new();

        assert_eq!(executor.count(&query, &token).unwrap(), 5);
        assert_eq!(executor.execute(&query, &token).unwrap().total, 5);
        assert_eq!(f.store.metrics().snapshot().queries_executed, 2);
    }

    #[test]
    fn test_rejects_invalid_query() {
        let f = fixture();
        let query = QueryBuilder::new().or().filter(f.age.eq(18)).build();

        let err = QueryExecutor::new(&f.store)
            .execute(&query, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.code(), ExecutorErrorCode::QueryInvalid);
        assert_eq!(f.store.metrics().snapshot().queries_rejected, 1);
        assert!(events(&f.buffer).contains(&"QUERY_REJECTED".to_string()));
    }

    #[test]
    fn test_comparator_error_fails_query() {
        let f = fixture();
        // unindexed field, so the failure comes from exact filtering
        let query = QueryBuilder::new().filter(f.email.gt(5)).build();

        let err = QueryExecutor::new(&f.store)
            .execute(&query, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.code(), ExecutorErrorCode::ExecutionFailed);
        assert!(err.message().starts_with("execute query:"));
        assert_eq!(f.store.metrics().snapshot().queries_failed, 1);
        assert!(events(&f.buffer).contains(&"QUERY_FAILED".to_string()));
    }

    #[test]
    fn test_index_error_fails_query() {
        let f = fixture();
        let query = QueryBuilder::new().filter(f.age.gt("old")).build();

        let err = QueryExecutor::new(&f.store)
            .count(&query, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.code(), ExecutorErrorCode::ExecutionFailed);
    }

    #[test]
    fn test_cancelled_mid_scan() {
        let f = fixture();
        let token = CancellationToken::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let t = token.clone();
        let counter = Arc::clone(&seen);
        let query = QueryBuilder::new()
            .filter(f.age.ge(0))
            .on_iteration(move |_: &User| {
                if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                    t.cancel();
                }
            })
            .build();

        let err = QueryExecutor::new(&f.store)
            .execute(&query, &token)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(f.store.metrics().snapshot().queries_cancelled, 1);
        assert!(events(&f.buffer).contains(&"QUERY_CANCELLED".to_string()));
    }

    #[test]
    fn test_empty_query_returns_everything_by_id() {
        let f = fixture();
        let output = QueryExecutor::new(&f.store)
            .execute(&Query::all(), &CancellationToken::new())
            .unwrap();
        assert_eq!(output.total, 5);
        assert_eq!(ids(output), vec![1, 2, 3, 4, 5]);
    }
}
