//! Index registry and preselection
//!
//! # API
//!
//! - `add(index, existing)` - Register an index and backfill it
//! - `insert/delete/update(record)` - Fan out to every index
//! - `select_for_condition(condition)` - Cheapest index's candidate buckets
//! - `preselect(conditions)` - Approximate bracket-fold over candidates

use std::sync::Arc;

use super::types::{Index, Selection, Weight};
use crate::idset::IdSet;
use crate::query::{
    evaluate, ComparatorError, ComparatorResult, Condition, Conditions, Connective, Fold,
};
use crate::schema::Field;

/// Per-store collection of indexes, grouped by field ordinal
pub struct IndexSet<R> {
    by_field: Vec<Vec<Arc<dyn Index<R>>>>,
}

impl<R> Default for IndexSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> IndexSet<R> {
    pub fn new() -> Self {
        Self {
            by_field: Vec::new(),
        }
    }

    /// Registers `index`, first inserting every record in `existing`
    pub fn add<'a>(&mut self, index: Arc<dyn Index<R>>, existing: impl IntoIterator<Item = &'a R>)
    where
        R: 'a,
    {
        for record in existing {
            index.insert(record);
        }
        let ordinal = index.field().ordinal();
        if self.by_field.len() <= ordinal {
            self.by_field.resize_with(ordinal + 1, Vec::new);
        }
        self.by_field[ordinal].push(index);
    }

    /// Indexes declared on `field`, in registration order
    pub fn indexes_for(&self, field: &Field) -> &[Arc<dyn Index<R>>] {
        self.by_field
            .get(field.ordinal())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of registered indexes
    pub fn len(&self) -> usize {
        self.by_field.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all(&self) -> impl Iterator<Item = &Arc<dyn Index<R>>> {
        self.by_field.iter().flatten()
    }

    pub fn insert(&self, record: &R) {
        for index in self.all() {
            index.insert(record);
        }
    }

    pub fn delete(&self, record: &R) {
        for index in self.all() {
            index.delete(record);
        }
    }

    pub fn update(&self, old: &R, new: &R) {
        for index in self.all() {
            index.update(old, new);
        }
    }

    /// Candidate buckets from the lowest-weight index able to serve
    /// `condition`. `None` when no index on the field applies; the first
    /// registered index wins ties.
    pub fn select_for_condition(
        &self,
        condition: &Condition<R>,
    ) -> ComparatorResult<Option<Selection>> {
        let mut best: Option<(Weight, &Arc<dyn Index<R>>)> = None;
        for index in self.indexes_for(condition.field()) {
            let Some(weight) = index.weight(condition) else {
                continue;
            };
            if best.as_ref().map_or(true, |(w, _)| weight < *w) {
                best = Some((weight, index));
            }
        }

        match best {
            Some((_, index)) => index.select(condition).map(Some),
            None => Ok(None),
        }
    }

    /// Approximate candidate set for `conditions`
    pub fn preselect(&self, conditions: &Conditions<R>) -> ComparatorResult<Candidates> {
        evaluate(conditions, &mut ApproximateFold::new(self))
    }
}

/// Approximate accumulator: a superset of the matching identifiers
#[derive(Debug, Clone)]
pub enum Candidates {
    /// No information; every record is a candidate
    All,
    /// Union of `sets`. `disjoint` when no identifier is in two sets.
    Sets {
        count: usize,
        sets: Vec<Arc<IdSet>>,
        disjoint: bool,
    },
}

impl Candidates {
    pub fn is_all(&self) -> bool {
        matches!(self, Candidates::All)
    }

    /// Candidate count; `None` for `All`
    pub fn count(&self) -> Option<usize> {
        match self {
            Candidates::All => None,
            Candidates::Sets { count, .. } => Some(*count),
        }
    }

    /// AND keeps the smaller operand, OR concatenates
    pub fn combine(self, connective: Connective, other: Candidates) -> Candidates {
        use Candidates::{All, Sets};

        match (connective, self, other) {
            (Connective::And, All, x) | (Connective::And, x, All) => x,
            (Connective::Or, All, _) | (Connective::Or, _, All) => All,
            (Connective::And, left, right) => {
                if right.count() < left.count() {
                    right
                } else {
                    left
                }
            }
            (
                Connective::Or,
                Sets {
                    count: lc,
                    sets: mut ls,
                    disjoint: ld,
                },
                Sets {
                    count: rc,
                    sets: rs,
                    disjoint: rd,
                },
            ) => {
                let disjoint = (ld && rs.is_empty()) || (rd && ls.is_empty());
                ls.extend(rs);
                Sets {
                    count: lc + rc,
                    sets: ls,
                    disjoint,
                }
            }
        }
    }

    /// True when no right operand can change the value under `connective`
    pub fn decides(&self, connective: Connective) -> bool {
        match connective {
            Connective::And => self.count() == Some(0),
            Connective::Or => self.is_all(),
        }
    }
}

/// Bracket-fold over candidate sets
pub struct ApproximateFold<'a, R> {
    indexes: &'a IndexSet<R>,
}

impl<'a, R> ApproximateFold<'a, R> {
    pub fn new(indexes: &'a IndexSet<R>) -> Self {
        Self { indexes }
    }
}

impl<'a, R> Fold<R> for ApproximateFold<'a, R> {
    type Acc = Candidates;
    type Error = ComparatorError;

    fn everything(&self) -> Candidates {
        Candidates::All
    }

    fn eval(&mut self, condition: &Condition<R>) -> ComparatorResult<Candidates> {
        Ok(match self.indexes.select_for_condition(condition)? {
            None => Candidates::All,
            Some(selection) => Candidates::Sets {
                count: selection.count,
                sets: selection.sets,
                disjoint: true,
            },
        })
    }

    fn combine(&self, left: Candidates, connective: Connective, right: Candidates) -> Candidates {
        left.combine(connective, right)
    }

    fn decides(&self, acc: &Candidates, connective: Connective) -> bool {
        acc.decides(connective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{BTreeIndex, HashIndex};
    use crate::query::{Attribute, QueryBuilder};
    use crate::schema::{Record, Schema};

    #[derive(Debug)]
    struct Doc {
        id: i64,
        size: i64,
        tag: String,
    }

    impl Record for Doc {
        fn id(&self) -> i64 {
            self.id
        }
    }

    fn size(d: &Doc) -> i64 {
        d.size
    }

    fn tag(d: &Doc) -> String {
        d.tag.clone()
    }

    struct Fixture {
        indexes: IndexSet<Doc>,
        size: Attribute<Doc, i64>,
        tag: Attribute<Doc, String>,
        title: Attribute<Doc, String>,
    }

    fn fixture() -> Fixture {
        let schema = Schema::new("docs");
        let size_field = schema.field("size");
        let tag_field = schema.field("tag");
        let title_field = schema.field("title");

        let docs: Vec<Doc> = (1..=10)
            .map(|id| Doc {
                id,
                size: id * 100,
                tag: if id % 2 == 0 { "even" } else { "odd" }.to_string(),
            })
            .collect();

        let mut indexes: IndexSet<Doc> = IndexSet::new();
        indexes.add(
            Arc::new(HashIndex::new(size_field.clone(), size as fn(&Doc) -> i64)),
            &docs,
        );
        indexes.add(
            Arc::new(BTreeIndex::new(size_field.clone(), size as fn(&Doc) -> i64, 4)),
            &docs,
        );
        indexes.add(
            Arc::new(HashIndex::new(tag_field.clone(), tag as fn(&Doc) -> String)),
            &docs,
        );

        Fixture {
            indexes,
            size: Attribute::new(size_field, |d: &Doc| &d.size),
            tag: Attribute::new(tag_field, |d: &Doc| &d.tag),
            title: Attribute::new(title_field, |d: &Doc| &d.tag),
        }
    }

    fn ids(c: &Candidates) -> Vec<i64> {
        let Candidates::Sets { sets, .. } = c else {
            panic!("expected sets, got {:?}", c);
        };
        let mut ids: Vec<i64> = sets.iter().flat_map(|s| s.to_vec()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_registry_groups_by_field() {
        let f = fixture();
        assert_eq!(f.indexes.len(), 3);
        assert_eq!(f.indexes.indexes_for(f.size.field()).len(), 2);
        assert!(f.indexes.indexes_for(f.title.field()).is_empty());
    }

    #[test]
    fn test_cheapest_index_wins() {
        let f = fixture();
        // hash (Low) beats btree (Medium) for EQ
        let q = QueryBuilder::new().filter(f.size.eq(300)).build();
        let cond = q.conditions().iter().next().unwrap();
        let sel = f.indexes.select_for_condition(cond).unwrap().unwrap();
        assert_eq!(sel.count, 1);

        // btree (Low) beats hash (High) for ranges
        let q = QueryBuilder::new().filter(f.size.gt(800)).build();
        let cond = q.conditions().iter().next().unwrap();
        let sel = f.indexes.select_for_condition(cond).unwrap().unwrap();
        assert_eq!(sel.count, 2);
    }

    #[test]
    fn test_unindexed_field_is_none() {
        let f = fixture();
        let q = QueryBuilder::new().filter(f.title.eq("x")).build();
        let cond = q.conditions().iter().next().unwrap();
        assert!(f.indexes.select_for_condition(cond).unwrap().is_none());
    }

    #[test]
    fn test_preselect_and_keeps_smaller() {
        let f = fixture();
        let q = QueryBuilder::new()
            .filter(f.tag.eq("even"))
            .and(f.size.ge(900))
            .build();
        let c = f.indexes.preselect(q.conditions()).unwrap();
        assert_eq!(c.count(), Some(2));
        assert_eq!(ids(&c), vec![9, 10]);
    }

    #[test]
    fn test_preselect_or_concatenates() {
        let f = fixture();
        let q = QueryBuilder::new()
            .filter(f.size.lt(200))
            .or()
            .filter(f.size.ge(1000))
            .build();
        let c = f.indexes.preselect(q.conditions()).unwrap();
        assert_eq!(ids(&c), vec![1, 10]);
        assert!(matches!(c, Candidates::Sets { disjoint: false, .. }));
    }

    #[test]
    fn test_preselect_unindexed_is_all() {
        let f = fixture();
        let q = QueryBuilder::new()
            .filter(f.size.eq(100))
            .or()
            .filter(f.title.eq("x"))
            .build();
        assert!(f.indexes.preselect(q.conditions()).unwrap().is_all());

        let q = QueryBuilder::new()
            .filter(f.title.eq("x"))
            .filter(f.size.eq(100))
            .build();
        assert_eq!(ids(&f.indexes.preselect(q.conditions()).unwrap()), vec![1]);
    }

    #[test]
    fn test_empty_conditions_are_all() {
        let f = fixture();
        let q = QueryBuilder::<Doc>::new().build();
        assert!(f.indexes.preselect(q.conditions()).unwrap().is_all());
    }

    #[test]
    fn test_zero_count_short_circuits_and() {
        let f = fixture();
        // the second condition would fail the cast; it is never selected
        let q = QueryBuilder::new()
            .filter(f.size.eq(5))
            .and(f.tag.eq(3))
            .build();
        let c = f.indexes.preselect(q.conditions()).unwrap();
        assert_eq!(c.count(), Some(0));
    }

    #[test]
    fn test_fan_out_update() {
        let f = fixture();
        let old = Doc {
            id: 3,
            size: 300,
            tag: "odd".into(),
        };
        let new = Doc {
            id: 3,
            size: 5000,
            tag: "odd".into(),
        };
        f.indexes.update(&old, &new);

        let q = QueryBuilder::new().filter(f.size.gt(1000)).build();
        assert_eq!(ids(&f.indexes.preselect(q.conditions()).unwrap()), vec![3]);

        f.indexes.delete(&new);
        assert_eq!(f.indexes.preselect(q.conditions()).unwrap().count(), Some(0));
    }
}
