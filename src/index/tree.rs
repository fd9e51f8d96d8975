//! B-tree index: ordered key to bucket map
//!
//! Range conditions walk only the matching sub-range. Negated ranges are
//! flipped to the complementary range first:
//!
//! | condition | scan                              |
//! |-----------|-----------------------------------|
//! | `< k`     | ascend from the start, stop at k  |
//! | `<= k`    | descend from k inclusive          |
//! | `> k`     | descend from the end, stop at k   |
//! | `>= k`    | ascend from k inclusive           |
//!
//! Keys are ordered by [`ScalarValue::key_cmp`]. NaN keys sort last, fail
//! every range and satisfy every negated one: ranges skip the NaN bucket
//! and flipped ranges add it back. A NaN operand falls back to the key scan.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::btree::{scalar_less, BTree, Less};
use super::types::{operand_key, Index, IndexKind, IndexOptions, Selection, Weight};
use crate::idset::IdSet;
use crate::query::{ComparatorError, ComparatorResult, Comparison, Condition};
use crate::schema::{Field, Record, ScalarValue};

/// B-tree index over a key derived from each record
pub struct BTreeIndex<R, K> {
    field: Field,
    options: IndexOptions,
    key_fn: fn(&R) -> K,
    tree: RwLock<BTree<K, Arc<IdSet>>>,
}

impl<R, K> BTreeIndex<R, K>
where
    R: Record,
    K: ScalarValue,
{
    /// Non-unique index of order `max_children`
    pub fn new(field: Field, key_fn: fn(&R) -> K, max_children: usize) -> Self {
        Self::with_options(field, key_fn, max_children, IndexOptions::default())
    }

    pub fn with_options(
        field: Field,
        key_fn: fn(&R) -> K,
        max_children: usize,
        options: IndexOptions,
    ) -> Self {
        Self::with_less(field, key_fn, max_children, options, scalar_less::<K>)
    }

    /// Index ordered by a caller-supplied relation
    pub fn with_less(
        field: Field,
        key_fn: fn(&R) -> K,
        max_children: usize,
        options: IndexOptions,
        less: Less<K>,
    ) -> Self {
        Self {
            field,
            options,
            key_fn,
            tree: RwLock::new(BTree::with_less(max_children, less)),
        }
    }

    fn lookup(&self, key: &K) -> Option<Arc<IdSet>> {
        self.tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Bucket for `key`, created on first use
    fn bucket(&self, key: K) -> Arc<IdSet> {
        if let Some(set) = self.lookup(&key) {
            return set;
        }
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tree.get_or_insert_with(key, || Arc::new(self.options.new_bucket())))
    }

    fn range(&self, kind: Comparison, key: &K, selection: &mut Selection) {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        let mut collect = |k: &K, set: &Arc<IdSet>| {
            if !k.is_unordered() {
                selection.push(Arc::clone(set));
            }
            true
        };
        match kind {
            Comparison::Lt => tree.ascend(None, Some(key), &mut collect),
            Comparison::Le => tree.descend(Some((key, true)), None, &mut collect),
            Comparison::Gt => tree.descend(None, Some(key), &mut collect),
            Comparison::Ge => tree.ascend(Some((key, true)), None, &mut collect),
            _ => {}
        }
    }

    /// Buckets of unordered keys, which sit at the end of the tree
    fn unordered_tail(&self, selection: &mut Selection) {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        tree.descend(None, None, |key, set| {
            if !key.is_unordered() {
                return false;
            }
            selection.push(Arc::clone(set));
            true
        });
    }

    fn scan(&self, condition: &Condition<R>, selection: &mut Selection) -> ComparatorResult<()> {
        let comparator = condition.comparator();
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        let mut failure: Option<ComparatorError> = None;

        tree.ascend(None, None, |key, set| {
            match comparator.compare_value(&key.to_value()) {
                Ok(matched) => {
                    if matched ^ condition.is_negated() {
                        selection.push(Arc::clone(set));
                    }
                    true
                }
                Err(err) => {
                    failure = Some(err);
                    false
                }
            }
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<R, K> fmt::Debug for BTreeIndex<R, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTreeIndex")
            .field("field", &self.field)
            .field("options", &self.options)
            .finish()
    }
}

impl<R, K> Index<R> for BTreeIndex<R, K>
where
    R: Record,
    K: ScalarValue,
{
    fn field(&self) -> &Field {
        &self.field
    }

    fn kind(&self) -> IndexKind {
        IndexKind::BTree
    }

    fn is_unique(&self) -> bool {
        self.options.unique
    }

    fn key_count(&self) -> usize {
        self.tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn insert(&self, record: &R) {
        self.bucket((self.key_fn)(record)).add(record.id());
    }

    fn delete(&self, record: &R) {
        if let Some(set) = self.lookup(&(self.key_fn)(record)) {
            set.delete(record.id());
        }
    }

    fn update(&self, old: &R, new: &R) {
        let old_key = (self.key_fn)(old);
        let new_key = (self.key_fn)(new);
        if old_key.key_cmp(&new_key) == Ordering::Equal {
            return;
        }
        if let Some(set) = self.lookup(&old_key) {
            set.delete(old.id());
        }
        self.bucket(new_key).add(new.id());
    }

    fn weight(&self, condition: &Condition<R>) -> Option<Weight> {
        let kind = condition.comparator().kind();
        if kind.is_collection() {
            None
        } else if kind.is_range() {
            Some(Weight::Low)
        } else if kind.is_lookup() && !condition.is_negated() {
            Some(Weight::Medium)
        } else {
            Some(Weight::High)
        }
    }

    fn select(&self, condition: &Condition<R>) -> ComparatorResult<Selection> {
        let mut selection = Selection::new(self.options.unique);
        let comparator = condition.comparator();
        let kind = comparator.kind();

        if kind.is_range() {
            let key: K = operand_key(condition, 0)?;
            if key.is_unordered() {
                self.scan(condition, &mut selection)?;
                return Ok(selection);
            }
            let effective = if condition.is_negated() {
                kind.negated_range().unwrap_or(kind)
            } else {
                kind
            };
            self.range(effective, &key, &mut selection);
            if condition.is_negated() {
                self.unordered_tail(&mut selection);
            }
            return Ok(selection);
        }

        match kind {
            Comparison::Eq if !condition.is_negated() => {
                let key: K = operand_key(condition, 0)?;
                if let Some(set) = self.lookup(&key) {
                    selection.push(set);
                }
            }
            Comparison::InArray if !condition.is_negated() => {
                let mut seen: Vec<K> = Vec::with_capacity(comparator.values_count());
                for i in 0..comparator.values_count() {
                    let key: K = operand_key(condition, i)?;
                    if seen.iter().any(|k| k.key_cmp(&key) == Ordering::Equal) {
                        continue;
                    }
                    if let Some(set) = self.lookup(&key) {
                        selection.push(set);
                    }
                    seen.push(key);
                }
            }
            _ => self.scan(condition, &mut selection)?,
        }

        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Attribute, Query, QueryBuilder};
    use crate::schema::Schema;

    #[derive(Debug)]
    struct Reading {
        id: i64,
        celsius: i64,
    }

    impl Record for Reading {
        fn id(&self) -> i64 {
            self.id
        }
    }

    fn celsius(r: &Reading) -> i64 {
        r.celsius
    }

    fn setup(order: usize) -> (BTreeIndex<Reading, i64>, Attribute<Reading, i64>) {
        let schema = Schema::new("readings");
        let field = schema.field("celsius");
        let index = BTreeIndex::new(field.clone(), celsius as fn(&Reading) -> i64, order);
        // ids 1..=30, temperatures -10..=19
        for id in 1..=30 {
            index.insert(&Reading {
                id,
                celsius: id - 11,
            });
        }
        (index, Attribute::new(field, |r: &Reading| &r.celsius))
    }

    fn only<R>(query: Query<R>) -> Condition<R> {
        query.conditions().iter().next().cloned().unwrap()
    }

    #[derive(Debug)]
    struct Sample {
        id: i64,
        x: f64,
    }

    impl Record for Sample {
        fn id(&self) -> i64 {
            self.id
        }
    }

    fn sample_x(s: &Sample) -> f64 {
        s.x
    }

    fn sample_ids(index: &BTreeIndex<Sample, f64>, cond: &Condition<Sample>) -> Vec<i64> {
        let mut ids: Vec<i64> = index
            .select(cond)
            .unwrap()
            .sets
            .iter()
            .flat_map(|s| s.to_vec())
            .collect();
        ids.sort_unstable();
        ids
    }

    fn temps(index: &BTreeIndex<Reading, i64>, cond: &Condition<Reading>) -> Vec<i64> {
        let sel = index.select(cond).unwrap();
        let mut out: Vec<i64> = sel
            .sets
            .iter()
            .flat_map(|s| s.to_vec())
            .map(|id| id - 11)
            .collect();
        out.sort_unstable();
        assert_eq!(sel.count, out.len());
        out
    }

    #[test]
    fn test_range_conditions() {
        let (index, c) = setup(3);
        let lt = only(QueryBuilder::new().filter(c.lt(-8)).build());
        assert_eq!(index.weight(&lt), Some(Weight::Low));
        assert_eq!(temps(&index, &lt), vec![-10, -9]);

        let le = only(QueryBuilder::new().filter(c.le(-8)).build());
        assert_eq!(temps(&index, &le), vec![-10, -9, -8]);

        let gt = only(QueryBuilder::new().filter(c.gt(17)).build());
        assert_eq!(temps(&index, &gt), vec![18, 19]);

        let ge = only(QueryBuilder::new().filter(c.ge(17)).build());
        assert_eq!(temps(&index, &ge), vec![17, 18, 19]);
    }

    #[test]
    fn test_negated_ranges_flip() {
        let (index, c) = setup(4);
        // NOT < 17  ==  >= 17
        let cond = only(QueryBuilder::new().not().filter(c.lt(17)).build());
        assert_eq!(index.weight(&cond), Some(Weight::Low));
        assert_eq!(temps(&index, &cond), vec![17, 18, 19]);

        // NOT >= -8  ==  < -8
        let cond = only(QueryBuilder::new().not().filter(c.ge(-8)).build());
        assert_eq!(temps(&index, &cond), vec![-10, -9]);

        // NOT <= 17  ==  > 17
        let cond = only(QueryBuilder::new().not().filter(c.le(17)).build());
        assert_eq!(temps(&index, &cond), vec![18, 19]);

        // NOT > -9  ==  <= -9
        let cond = only(QueryBuilder::new().not().filter(c.gt(-9)).build());
        assert_eq!(temps(&index, &cond), vec![-10, -9]);
    }

    #[test]
    fn test_point_lookups_weigh_medium() {
        let (index, c) = setup(32);
        let eq = only(QueryBuilder::new().filter(c.eq(0)).build());
        assert_eq!(index.weight(&eq), Some(Weight::Medium));
        assert_eq!(temps(&index, &eq), vec![0]);

        let within = only(QueryBuilder::new().filter(c.in_array([1, 3, 99])).build());
        assert_eq!(temps(&index, &within), vec![1, 3]);

        let not_eq = only(QueryBuilder::new().not().filter(c.eq(0)).build());
        assert_eq!(index.weight(&not_eq), Some(Weight::High));
        assert_eq!(temps(&index, &not_eq).len(), 29);
    }

    #[test]
    fn test_scan_propagates_comparator_error() {
        let (index, c) = setup(3);
        let cond = only(QueryBuilder::new().filter(c.like(1)).build());
        assert_eq!(index.weight(&cond), Some(Weight::High));
        assert!(matches!(
            index.select(&cond),
            Err(ComparatorError::NotImplemented { .. })
        ));
    }

    #[test]
    fn test_update_skips_unchanged_key() {
        let (index, c) = setup(3);
        let old = Reading { id: 11, celsius: 0 };
        index.update(&old, &Reading { id: 11, celsius: 0 });
        let eq = only(QueryBuilder::new().filter(c.eq(0)).build());
        assert_eq!(temps(&index, &eq), vec![0]);

        index.update(&old, &Reading { id: 11, celsius: 50 });
        assert!(temps(&index, &eq).is_empty());
        let gt = only(QueryBuilder::new().filter(c.gt(19)).build());
        assert_eq!(index.select(&gt).unwrap().count, 1);
        assert_eq!(index.key_count(), 31);
    }

    #[test]
    fn test_float_keys_keep_nan_apart() {
        let schema = Schema::new("samples");
        let field = schema.field("x");
        let index = BTreeIndex::new(field.clone(), sample_x as fn(&Sample) -> f64, 3);
        let xs = [1.0, 2.0, f64::NAN, 3.0, -0.0, f64::INFINITY, f64::NAN];
        for (i, x) in xs.iter().enumerate() {
            index.insert(&Sample {
                id: i as i64 + 1,
                x: *x,
            });
        }
        // both NaNs share one key
        assert_eq!(index.key_count(), 6);
        let x = Attribute::new(field, |s: &Sample| &s.x);

        // NOT x < 2.5 holds for NaN
        let cond = only(QueryBuilder::new().not().filter(x.lt(2.5)).build());
        assert_eq!(sample_ids(&index, &cond), vec![3, 4, 6, 7]);

        // flipped to x < 2.5, plus the NaN bucket
        let cond = only(QueryBuilder::new().not().filter(x.ge(2.5)).build());
        assert_eq!(sample_ids(&index, &cond), vec![1, 2, 3, 5, 7]);

        let cond = only(QueryBuilder::new().filter(x.gt(2.5)).build());
        assert_eq!(sample_ids(&index, &cond), vec![4, 6]);

        // NaN operand: every key is scanned
        let cond = only(QueryBuilder::new().not().filter(x.le(f64::NAN)).build());
        assert_eq!(sample_ids(&index, &cond), vec![1, 2, 3, 4, 5, 6, 7]);

        // -0.0 and 0.0 are one key
        let cond = only(QueryBuilder::new().filter(x.eq(0.0)).build());
        assert_eq!(sample_ids(&index, &cond), vec![5]);

        let cond = only(QueryBuilder::new().filter(x.in_array([f64::NAN, f64::NAN])).build());
        let selection = index.select(&cond).unwrap();
        assert_eq!(selection.sets.len(), 1);
        assert_eq!(selection.count, 2);
    }
}
