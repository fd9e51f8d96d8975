//! The store: canonical record map plus its indexes
//!
//! # Lock Order
//!
//! record map, then index registry, then per-index map, then bucket.
//! Writers hold the record map write lock while maintaining indexes, so a
//! reader holding the map read lock sees indexes that agree with it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

use super::config::StoreConfig;
use super::errors::{ConfigResult, StoreError, StoreResult};
use crate::executor::{CancellationToken, ExecutorResult, QueryExecutor, QueryIterator};
use crate::index::{BTreeIndex, Candidates, HashIndex, Index, IndexOptions, IndexSet};
use crate::observability::{log_event, Event, Logger, StoreMetrics};
use crate::query::{ComparatorResult, Conditions, Query};
use crate::schema::{Field, Record, ScalarValue};

/// Result of [`Store::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Records handed to the executor for exact filtering
#[derive(Debug)]
pub struct Preselection<R> {
    pub records: Vec<Arc<R>>,
    /// False when every record was scanned
    pub used_index: bool,
}

/// In-memory, indexed record store
pub struct Store<R> {
    config: StoreConfig,
    records: RwLock<HashMap<i64, Arc<R>>>,
    indexes: RwLock<IndexSet<R>>,
    logger: Arc<Logger>,
    metrics: StoreMetrics,
}

impl<R: Record> Store<R> {
    /// Create an empty store.
    ///
    /// Registers a unique hash index on the identifier unless
    /// `config.index_identifier` is false.
    pub fn new(config: StoreConfig, logger: Arc<Logger>) -> ConfigResult<Self> {
        config.validate()?;

        let indexes = if config.index_identifier {
            identifier_indexes()
        } else {
            IndexSet::new()
        };

        log_event(
            &logger,
            Event::StoreCreated,
            &[
                ("index_identifier", config.index_identifier.to_string()),
                ("full_scan_ratio", config.full_scan_ratio.to_string()),
            ],
        );

        Ok(Self {
            config,
            records: RwLock::new(HashMap::new()),
            indexes: RwLock::new(indexes),
            logger,
            metrics: StoreMetrics::new(),
        })
    }

    /// Store with default configuration that logs nothing
    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::default(),
            records: RwLock::new(HashMap::new()),
            indexes: RwLock::new(identifier_indexes()),
            logger: Arc::new(Logger::discard()),
            metrics: StoreMetrics::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Register `index`, backfilling it from the records already stored
    pub fn add_index(&self, index: Arc<dyn Index<R>>) {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);

        let fields = [
            ("field", index.field().name().to_string()),
            ("kind", index.kind().as_str().to_string()),
            ("unique", index.is_unique().to_string()),
            ("backfilled", records.len().to_string()),
        ];
        indexes.add(index, records.values().map(|r| r.as_ref()));
        log_event(&self.logger, Event::IndexAdded, &fields);
    }

    /// Register a hash index on `field`
    pub fn add_hash_index<K>(&self, field: Field, key_fn: fn(&R) -> K, options: IndexOptions)
    where
        K: ScalarValue + Hash + Eq,
    {
        self.add_index(Arc::new(HashIndex::with_options(field, key_fn, options)));
    }

    /// Register a B-tree index on `field` of order
    /// `config.default_btree_max_children`
    pub fn add_btree_index<K>(&self, field: Field, key_fn: fn(&R) -> K, options: IndexOptions)
    where
        K: ScalarValue,
    {
        self.add_index(Arc::new(BTreeIndex::with_options(
            field,
            key_fn,
            self.config.default_btree_max_children,
            options,
        )));
    }

    /// Number of registered indexes, including the identifier index
    pub fn index_count(&self) -> usize {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Insert a new record.
    ///
    /// Fails with `RecordExists` if the identifier is already stored; the
    /// store is left unchanged.
    pub fn insert(&self, mut record: R) -> StoreResult<()> {
        let id = checked_id(&record)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&id) {
            return Err(StoreError::RecordExists(id));
        }

        record.compute_fields();
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(&record);
        records.insert(id, Arc::new(record));
        drop(records);

        self.metrics.increment_inserts();
        log_event(&self.logger, Event::RecordInserted, &[("id", id.to_string())]);
        Ok(())
    }

    /// Insert, or replace the record with the same identifier.
    ///
    /// On replace, only indexes whose derived key changed move the
    /// identifier between buckets.
    pub fn upsert(&self, mut record: R) -> StoreResult<UpsertOutcome> {
        let id = checked_id(&record)?;
        record.compute_fields();

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let outcome = match records.get(&id) {
            Some(old) => {
                indexes.update(old, &record);
                UpsertOutcome::Updated
            }
            None => {
                indexes.insert(&record);
                UpsertOutcome::Inserted
            }
        };
        records.insert(id, Arc::new(record));
        drop(indexes);
        drop(records);

        match outcome {
            UpsertOutcome::Inserted => {
                self.metrics.increment_inserts();
                log_event(&self.logger, Event::RecordInserted, &[("id", id.to_string())]);
            }
            UpsertOutcome::Updated => {
                self.metrics.increment_updates();
                log_event(&self.logger, Event::RecordUpdated, &[("id", id.to_string())]);
            }
        }
        Ok(outcome)
    }

    /// Remove a record. Returns false if it was absent.
    pub fn delete(&self, id: i64) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = records.get(&id).cloned() else {
            return false;
        };

        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .delete(&record);
        records.remove(&id);
        drop(records);

        self.metrics.increment_deletes();
        log_event(&self.logger, Event::RecordDeleted, &[("id", id.to_string())]);
        true
    }

    pub fn get(&self, id: i64) -> Option<Arc<R>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate records for `conditions`: a superset of the matches.
    ///
    /// Falls back to every record when no index narrows the search or the
    /// candidate count reaches `total * full_scan_ratio`.
    pub fn preselect(&self, conditions: &Conditions<R>) -> ComparatorResult<Preselection<R>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let candidates = indexes.preselect(conditions)?;
        let total = records.len();

        let (sets, disjoint, count) = match candidates {
            Candidates::Sets {
                count,
                sets,
                disjoint,
            } if (count as f64) < total as f64 * self.config.full_scan_ratio => {
                (sets, disjoint, count)
            }
            other => {
                self.metrics.increment_full_scans();
                log_event(
                    &self.logger,
                    Event::PreselectFullScan,
                    &[
                        ("total", total.to_string()),
                        (
                            "candidates",
                            other.count().map_or("all".to_string(), |c| c.to_string()),
                        ),
                    ],
                );
                return Ok(Preselection {
                    records: records.values().cloned().collect(),
                    used_index: false,
                });
            }
        };

        let mut out = Vec::with_capacity(count);
        let mut seen: HashSet<i64> = HashSet::new();
        for set in &sets {
            set.for_each(|id| {
                if !disjoint && !seen.insert(id) {
                    return;
                }
                // ids can outlive their record in a unique bucket
                if let Some(record) = records.get(&id) {
                    out.push(Arc::clone(record));
                }
            });
        }

        self.metrics.increment_indexed_preselections();
        log_event(
            &self.logger,
            Event::PreselectIndexed,
            &[
                ("total", total.to_string()),
                ("candidates", out.len().to_string()),
                ("buckets", sets.len().to_string()),
            ],
        );
        Ok(Preselection {
            records: out,
            used_index: true,
        })
    }

    /// Matching records, sorted and paginated
    pub fn fetch_all(
        &self,
        query: &Query<R>,
        token: &CancellationToken,
    ) -> ExecutorResult<QueryIterator<R>> {
        QueryExecutor::new(self)
            .execute(query, token)
            .map(|output| output.iterator)
    }

    /// Number of matching records, ignoring limit and offset
    pub fn fetch_total(&self, query: &Query<R>, token: &CancellationToken) -> ExecutorResult<usize> {
        QueryExecutor::new(self).count(query, token)
    }

    pub fn fetch_all_and_total(
        &self,
        query: &Query<R>,
        token: &CancellationToken,
    ) -> ExecutorResult<(QueryIterator<R>, usize)> {
        QueryExecutor::new(self)
            .execute(query, token)
            .map(|output| (output.iterator, output.total))
    }
}

impl<R> fmt::Debug for Store<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Registry holding only the unique hash index on the identifier
fn identifier_indexes<R: Record>() -> IndexSet<R> {
    let mut indexes = IndexSet::new();
    indexes.add(
        Arc::new(HashIndex::unique(Field::id(), R::id as fn(&R) -> i64)),
        std::iter::empty(),
    );
    indexes
}

fn checked_id<R: Record>(record: &R) -> StoreResult<i64> {
    match record.id() {
        0 => Err(StoreError::InvalidIdentifier),
        id => Ok(id),
    }
}
