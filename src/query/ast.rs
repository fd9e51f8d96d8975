//! Query structures
//!
//! A query is a flat, bracket-annotated list of conditions plus sort,
//! pagination and an optional per-match callback. Queries are immutable
//! once built and cheap to clone.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::comparator::{Accessor, FieldComparator};
use super::errors::BuildErrors;
use super::evaluator::Connective;
use crate::schema::{Field, Record, ScalarValue};

/// One predicate with its position in the boolean expression
pub struct Condition<R> {
    pub(crate) comparator: Arc<dyn FieldComparator<R>>,
    pub(crate) negate: bool,
    pub(crate) or: bool,
    pub(crate) depth: usize,
    pub(crate) opens: usize,
}

impl<R> Condition<R> {
    pub fn comparator(&self) -> &dyn FieldComparator<R> {
        self.comparator.as_ref()
    }

    pub fn field(&self) -> &Field {
        self.comparator.field()
    }

    /// True when the predicate result is inverted
    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// Connective to the previous element at the same depth
    pub fn connective(&self) -> Connective {
        if self.or {
            Connective::Or
        } else {
            Connective::And
        }
    }

    /// Bracket depth, starting at 1
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of brackets opened immediately before this condition
    pub fn opens(&self) -> usize {
        self.opens
    }
}

impl<R> Clone for Condition<R> {
    fn clone(&self) -> Self {
        Self {
            comparator: Arc::clone(&self.comparator),
            negate: self.negate,
            or: self.or,
            depth: self.depth,
            opens: self.opens,
        }
    }
}

impl<R> fmt::Debug for Condition<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("comparator", &self.comparator)
            .field("negate", &self.negate)
            .field("or", &self.or)
            .field("depth", &self.depth)
            .field("opens", &self.opens)
            .finish()
    }
}

/// Ordered, well-nested condition list. Only the builder creates one.
pub struct Conditions<R>(Vec<Condition<R>>);

impl<R> Conditions<R> {
    pub(crate) fn new(conditions: Vec<Condition<R>>) -> Self {
        Self(conditions)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition<R>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<R> fmt::Debug for Conditions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<'a, R> IntoIterator for &'a Conditions<R> {
    type Item = &'a Condition<R>;
    type IntoIter = std::slice::Iter<'a, Condition<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

type RecordOrdering<R> = dyn Fn(&R, &R) -> Ordering + Send + Sync;

/// One sort key: field, direction and a record comparator
pub struct SortKey<R> {
    field: Field,
    direction: Direction,
    cmp: Arc<RecordOrdering<R>>,
}

impl<R: 'static> SortKey<R> {
    /// Sort by a stored field
    pub fn by<T: ScalarValue>(field: Field, direction: Direction, getter: fn(&R) -> &T) -> Self {
        Self::from_accessor(field, direction, Accessor::Ref(getter))
    }

    /// Sort by a derived field
    pub fn by_computed<T: ScalarValue>(
        field: Field,
        direction: Direction,
        getter: fn(&R) -> T,
    ) -> Self {
        Self::from_accessor(field, direction, Accessor::Copied(getter))
    }

    pub(crate) fn from_accessor<T: ScalarValue>(
        field: Field,
        direction: Direction,
        accessor: Accessor<R, T>,
    ) -> Self {
        let cmp = move |a: &R, b: &R| {
            accessor.with(a, |x| {
                accessor.with(b, |y| x.key_cmp(y))
            })
        };
        Self {
            field,
            direction,
            cmp: Arc::new(cmp),
        }
    }
}

impl<R> SortKey<R> {
    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Compares two records under this key's direction
    pub fn compare(&self, a: &R, b: &R) -> Ordering {
        let ord = (self.cmp)(a, b);
        match self.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

impl<R: Record> SortKey<R> {
    /// Sort by identifier
    pub fn by_id(direction: Direction) -> Self {
        Self::by_computed(Field::id(), direction, R::id)
    }
}

impl<R> Clone for SortKey<R> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            direction: self.direction,
            cmp: Arc::clone(&self.cmp),
        }
    }
}

impl<R> fmt::Debug for SortKey<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortKey")
            .field("field", &self.field)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Per-match callback
pub type OnIteration<R> = Arc<dyn Fn(&R) + Send + Sync>;

/// An immutable, reusable query
pub struct Query<R> {
    pub(crate) conditions: Arc<Conditions<R>>,
    pub(crate) sort: Arc<[SortKey<R>]>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
    pub(crate) on_iteration: Option<OnIteration<R>>,
    pub(crate) error: Option<BuildErrors>,
}

impl<R> Query<R> {
    pub fn conditions(&self) -> &Conditions<R> {
        &self.conditions
    }

    pub fn sort_keys(&self) -> &[SortKey<R>] {
        &self.sort
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The errors collected while building, if any
    pub fn error(&self) -> Option<&BuildErrors> {
        self.error.as_ref()
    }

    /// Fails with every build-time mistake at once
    pub fn validate(&self) -> Result<(), BuildErrors> {
        match &self.error {
            Some(errors) => Err(errors.clone()),
            None => Ok(()),
        }
    }

    /// Invokes the per-match callback
    pub(crate) fn notify(&self, record: &R) {
        if let Some(callback) = &self.on_iteration {
            callback(record);
        }
    }

    /// Orders two records by the sort keys. Full ties compare equal.
    pub fn compare(&self, a: &R, b: &R) -> Ordering {
        for key in self.sort.iter() {
            match key.compare(a, b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        Self {
            conditions: Arc::clone(&self.conditions),
            sort: Arc::clone(&self.sort),
            limit: self.limit,
            offset: self.offset,
            on_iteration: self.on_iteration.clone(),
            error: self.error.clone(),
        }
    }
}

impl<R> fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("conditions", &self.conditions)
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("on_iteration", &self.on_iteration.is_some())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        id: i64,
        score: f64,
    }

    impl Record for Item {
        fn id(&self) -> i64 {
            self.id
        }
    }

    #[test]
    fn test_sort_key_directions() {
        let a = Item { id: 1, score: 1.5 };
        let b = Item { id: 2, score: 0.5 };
        let asc = SortKey::by(Field::id(), Direction::Asc, |i: &Item| &i.score);
        let desc = SortKey::by(Field::id(), Direction::Desc, |i: &Item| &i.score);

        assert_eq!(asc.compare(&a, &b), Ordering::Greater);
        assert_eq!(desc.compare(&a, &b), Ordering::Less);
        assert_eq!(asc.direction().as_str(), "asc");
    }

    #[test]
    fn test_sort_by_id() {
        let a = Item { id: 1, score: 0.0 };
        let b = Item { id: 2, score: 0.0 };
        let key = SortKey::<Item>::by_id(Direction::Desc);
        assert!(key.field().is_id());
        assert_eq!(key.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_nan_scores_sort_last() {
        let nan = Item {
            id: 1,
            score: f64::NAN,
        };
        let inf = Item {
            id: 2,
            score: f64::INFINITY,
        };
        let zero = Item { id: 3, score: -0.0 };
        let key = SortKey::by(Field::id(), Direction::Asc, |i: &Item| &i.score);
        assert_eq!(key.compare(&nan, &inf), Ordering::Greater);
        assert_eq!(key.compare(&inf, &nan), Ordering::Less);
        assert_eq!(key.compare(&nan, &nan), Ordering::Equal);
        assert_eq!(key.compare(&zero, &Item { id: 4, score: 0.0 }), Ordering::Equal);
    }

    #[test]
    fn test_query_compare_uses_keys_in_order() {
        fn compare_in<R>(query: &Query<R>, a: &R, b: &R) -> Ordering {
            query.compare(a, b)
        }

        let query = crate::query::QueryBuilder::new()
            .sort(SortKey::by(Field::id(), Direction::Desc, |i: &Item| &i.score))
            .sort(SortKey::by_id(Direction::Asc))
            .build();
        let a = Item {
            id: 1,
            score: f64::NAN,
        };
        let b = Item { id: 2, score: 9.0 };
        let c = Item {
            id: 3,
            score: f64::NAN,
        };
        assert_eq!(compare_in(&query, &a, &b), Ordering::Less);
        assert_eq!(compare_in(&query, &a, &c), Ordering::Less);
        assert_eq!(compare_in(&query, &c, &a), Ordering::Greater);
    }
}
