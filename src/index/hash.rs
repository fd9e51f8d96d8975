//! Hash index: unordered key to bucket map
//!
//! Direct lookups serve un-negated EQ and IN. Everything else scans every
//! distinct key and tests the comparator against it.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

use super::types::{operand_key, Index, IndexKind, IndexOptions, Selection, Weight};
use crate::idset::IdSet;
use crate::query::{ComparatorResult, Comparison, Condition};
use crate::schema::{Field, Record, ScalarValue};

/// Hash index over a key derived from each record
pub struct HashIndex<R, K> {
    field: Field,
    options: IndexOptions,
    key_fn: fn(&R) -> K,
    buckets: RwLock<HashMap<K, Arc<IdSet>>>,
}

impl<R, K> HashIndex<R, K>
where
    R: Record,
    K: ScalarValue + Hash + Eq,
{
    /// Non-unique index with locked buckets
    pub fn new(field: Field, key_fn: fn(&R) -> K) -> Self {
        Self::with_options(field, key_fn, IndexOptions::default())
    }

    pub fn unique(field: Field, key_fn: fn(&R) -> K) -> Self {
        Self::with_options(field, key_fn, IndexOptions::unique())
    }

    pub fn with_options(field: Field, key_fn: fn(&R) -> K, options: IndexOptions) -> Self {
        Self {
            field,
            options,
            key_fn,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn lookup(&self, key: &K) -> Option<Arc<IdSet>> {
        self.buckets
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
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            buckets
                .entry(key)
                .or_insert_with(|| Arc::new(self.options.new_bucket())),
        )
    }

    fn scan(&self, condition: &Condition<R>, selection: &mut Selection) -> ComparatorResult<()> {
        let comparator = condition.comparator();
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        for (key, set) in buckets.iter() {
            if comparator.compare_value(&key.to_value())? ^ condition.is_negated() {
                selection.push(Arc::clone(set));
            }
        }
        Ok(())
    }
}

impl<R, K> fmt::Debug for HashIndex<R, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashIndex")
            .field("field", &self.field)
            .field("options", &self.options)
            .finish()
    }
}

impl<R, K> Index<R> for HashIndex<R, K>
where
    R: Record,
    K: ScalarValue + Hash + Eq,
{
    fn field(&self) -> &Field {
        &self.field
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Hash
    }

    fn is_unique(&self) -> bool {
        self.options.unique
    }

    fn key_count(&self) -> usize {
        self.buckets
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
        if old_key == new_key {
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
        } else if kind.is_lookup() && !condition.is_negated() {
            Some(Weight::Low)
        } else {
            Some(Weight::High)
        }
    }

    fn select(&self, condition: &Condition<R>) -> ComparatorResult<Selection> {
        let mut selection = Selection::new(self.options.unique);
        let comparator = condition.comparator();

        match comparator.kind() {
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
                    if seen.contains(&key) {
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
    use crate::query::{Attribute, QueryBuilder};
    use crate::schema::Schema;

    #[derive(Debug, Clone)]
    struct User {
        id: i64,
        city: String,
    }

    impl Record for User {
        fn id(&self) -> i64 {
            self.id
        }
    }

    fn user(id: i64, city: &str) -> User {
        User {
            id,
            city: city.into(),
        }
    }

    fn city_key(u: &User) -> String {
        u.city.clone()
    }

    fn setup() -> (HashIndex<User, String>, Attribute<User, String>) {
        let schema = Schema::new("users");
        let field = schema.field("city");
        let index = HashIndex::new(field.clone(), city_key as fn(&User) -> String);
        for (id, city) in [(1, "paris"), (2, "oslo"), (3, "paris"), (4, "rome")] {
            index.insert(&user(id, city));
        }
        (index, Attribute::new(field, |u: &User| &u.city))
    }

    fn ids(selection: &Selection) -> Vec<i64> {
        let mut ids: Vec<i64> = selection.sets.iter().flat_map(|s| s.to_vec()).collect();
        ids.sort_unstable();
        ids
    }

    fn only(query: crate::query::Query<User>) -> Condition<User> {
        query.conditions().iter().next().cloned().unwrap()
    }

    #[test]
    fn test_eq_lookup() {
        let (index, city) = setup();
        let cond = only(QueryBuilder::new().filter(city.eq("paris")).build());
        assert_eq!(index.weight(&cond), Some(Weight::Low));
        let sel = index.select(&cond).unwrap();
        assert_eq!(sel.count, 2);
        assert_eq!(ids(&sel), vec![1, 3]);
        assert_eq!(index.key_count(), 3);
    }

    #[test]
    fn test_in_array_dedupes_operands() {
        let (index, city) = setup();
        let cond = only(
            QueryBuilder::new()
                .filter(city.in_array(["oslo", "rome", "oslo", "lima"]))
                .build(),
        );
        let sel = index.select(&cond).unwrap();
        assert_eq!(sel.sets.len(), 2);
        assert_eq!(ids(&sel), vec![2, 4]);
    }

    #[test]
    fn test_negated_eq_scans_keys() {
        let (index, city) = setup();
        let cond = only(QueryBuilder::new().not().filter(city.eq("paris")).build());
        assert_eq!(index.weight(&cond), Some(Weight::High));
        assert_eq!(ids(&index.select(&cond).unwrap()), vec![2, 4]);
    }

    #[test]
    fn test_like_scans_keys() {
        let (index, city) = setup();
        let cond = only(QueryBuilder::new().filter(city.like("o")).build());
        assert_eq!(ids(&index.select(&cond).unwrap()), vec![2, 4]);
    }

    #[test]
    fn test_update_moves_bucket() {
        let (index, city) = setup();
        index.update(&user(1, "paris"), &user(1, "oslo"));
        let cond = only(QueryBuilder::new().filter(city.eq("oslo")).build());
        assert_eq!(ids(&index.select(&cond).unwrap()), vec![1, 2]);

        let cond = only(QueryBuilder::new().filter(city.eq("paris")).build());
        assert_eq!(ids(&index.select(&cond).unwrap()), vec![3]);
    }

    #[test]
    fn test_delete() {
        let (index, city) = setup();
        index.delete(&user(4, "rome"));
        let cond = only(QueryBuilder::new().filter(city.eq("rome")).build());
        let sel = index.select(&cond).unwrap();
        assert_eq!(sel.count, 0);
        assert!(sel.sets.is_empty());
    }

    #[test]
    fn test_operand_type_error_surfaces() {
        let (index, city) = setup();
        let cond = only(QueryBuilder::new().filter(city.eq(5)).build());
        assert!(index.select(&cond).is_err());
    }

    #[test]
    fn test_unique_lock_free_options() {
        let index: HashIndex<User, String> =
            HashIndex::unique(Field::id(), city_key as fn(&User) -> String);
        assert!(index.is_unique());
        index.insert(&user(1, "x"));
        index.insert(&user(2, "x"));
        assert_eq!(index.key_count(), 1);

        let index: HashIndex<User, String> =
            HashIndex::with_options(Field::id(), city_key, IndexOptions::lock_free());
        index.insert(&user(1, "x"));
        index.insert(&user(2, "x"));
        assert!(!index.is_unique());
        assert_eq!(index.lookup(&"x".to_string()).map(|s| s.count()), Some(2));
    }
}
