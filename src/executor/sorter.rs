//! Result ordering for query execution
//!
//! Every match is held in a `BinaryHeap` keyed by the query's sort keys.
//! Records are popped in result order, so only the records the caller
//! iterates over are extracted. Records whose keys all tie are ordered by
//! ascending identifier, which makes the output deterministic.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::query::{Query, SortKey};
use crate::schema::Record;

/// A match together with the keys that order it
struct Ranked<R> {
    record: Arc<R>,
    keys: Arc<[SortKey<R>]>,
}

impl<R: Record> Ranked<R> {
    fn order(&self, other: &Self) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(&self.record, &other.record))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.record.id().cmp(&other.record.id()))
    }
}

impl<R: Record> PartialEq for Ranked<R> {
    fn eq(&self, other: &Self) -> bool {
        self.order(other) == Ordering::Equal
    }
}

impl<R: Record> Eq for Ranked<R> {}

impl<R: Record> PartialOrd for Ranked<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Record> Ord for Ranked<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order(other)
    }
}

/// Min-heap of matched records in result order
pub struct ResultSorter<R> {
    keys: Arc<[SortKey<R>]>,
    heap: BinaryHeap<Reverse<Ranked<R>>>,
}

impl<R: Record> ResultSorter<R> {
    pub fn new(query: &Query<R>) -> Self {
        Self {
            keys: Arc::clone(&query.sort),
            heap: BinaryHeap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, record: Arc<R>) {
        self.heap.push(Reverse(Ranked {
            record,
            keys: Arc::clone(&self.keys),
        }));
    }

    /// Removes and returns the first record in result order
    pub fn pop(&mut self) -> Option<Arc<R>> {
        self.heap.pop().map(|Reverse(ranked)| ranked.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Attribute, Direction, QueryBuilder, SortKey};
    use crate::schema::Schema;

    #[derive(Debug)]
    struct Person {
        id: i64,
        age: i64,
        name: String,
    }

    impl Record for Person {
        fn id(&self) -> i64 {
            self.id
        }
    }

    fn person(id: i64, age: i64, name: &str) -> Arc<Person> {
        Arc::new(Person {
            id,
            age,
            name: name.to_string(),
        })
    }

    fn drain(mut sorter: ResultSorter<Person>) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(p) = sorter.pop() {
            out.push(p.id);
        }
        out
    }

    fn people() -> Vec<Arc<Person>> {
        vec![
            person(4, 30, "dana"),
            person(1, 20, "alice"),
            person(6, 25, "bob"),
            person(3, 25, "carol"),
            person(2, 30, "bob"),
            person(5, 20, "erin"),
        ]
    }

    #[test]
    fn test_sort_ascending() {
        let schema = Schema::new("people");
        let age = Attribute::new(schema.field("age"), |p: &Person| &p.age);
        let query = QueryBuilder::new().sort(age.asc()).build();

        let mut sorter = ResultSorter::new(&query);
        for p in people() {
            sorter.push(p);
        }
        assert_eq!(sorter.len(), 6);
        // ties on age fall back to ascending id
        assert_eq!(drain(sorter), vec![1, 5, 3, 6, 2, 4]);
    }

    #[test]
    fn test_sort_descending_then_by_name() {
        let schema = Schema::new("people");
        let age = Attribute::new(schema.field("age"), |p: &Person| &p.age);
        let name = Attribute::new(schema.field("name"), |p: &Person| &p.name);
        let query = QueryBuilder::new()
            .sort(age.desc())
            .sort(name.asc())
            .build();

        let mut sorter = ResultSorter::new(&query);
        for p in people() {
            sorter.push(p);
        }
        assert_eq!(drain(sorter), vec![2, 4, 6, 3, 1, 5]);
    }

    #[test]
    fn test_no_sort_keys_orders_by_id() {
        let query: Query<Person> = Query::all();
        let mut sorter = ResultSorter::new(&query);
        for p in people() {
            sorter.push(p);
        }
        assert_eq!(drain(sorter), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_sort_by_id_descending() {
        let query = QueryBuilder::<Person>::new()
            .sort(SortKey::by_id(Direction::Desc))
            .build();
        let mut sorter = ResultSorter::new(&query);
        for p in people() {
            sorter.push(p);
        }
        assert_eq!(drain(sorter), vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_pop_empty() {
        let query: Query<Person> = Query::all();
        let mut sorter = ResultSorter::new(&query);
        assert!(sorter.is_empty());
        assert!(sorter.pop().is_none());
    }

    #[test]
    fn test_nan_keys_sort_after_numbers() {
        let schema = Schema::new("people");
        fn ratio(p: &Person) -> f64 {
            if p.age == 25 {
                f64::NAN
            } else {
                p.age as f64
            }
        }
        let query = QueryBuilder::new()
            .sort(SortKey::by_computed(schema.field("ratio"), Direction::Asc, ratio))
            .build();

        let mut sorter = ResultSorter::new(&query);
        for p in people() {
            sorter.push(p);
        }
        assert_eq!(drain(sorter), vec![1, 5, 2, 4, 3, 6]);
    }
}
