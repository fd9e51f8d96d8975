//! Field comparators
//!
//! A comparator is a predicate bound to one field: a comparison kind plus
//! zero or more operand values. Scalar fields share one generic comparator
//! parameterized over [`ScalarValue`]; set and map fields delegate to the
//! record-supplied [`SetLike`] / [`MapLike`] collections.
//!
//! # Contract
//!
//! - `compare(record)` is equivalent to `compare_value(getter(record))`
//! - Unsupported kinds are reported as `NotImplemented`, never a panic
//! - Operands are cast once at construction; a failed cast is reported on
//!   every evaluation

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use regex::Regex;

use super::ast::{Direction, SortKey};
use super::errors::{ComparatorError, ComparatorResult};
use crate::schema::{Field, Record, ScalarValue, Value};

/// Comparison kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    InArray,
    /// Substring containment
    Like,
    /// Pattern match
    Regexp,
    SetHas,
    MapHasKey,
    MapHasValue,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::InArray => "IN",
            Comparison::Like => "LIKE",
            Comparison::Regexp => "REGEXP",
            Comparison::SetHas => "SET HAS",
            Comparison::MapHasKey => "MAP HAS KEY",
            Comparison::MapHasValue => "MAP HAS VALUE",
        }
    }

    /// Returns true for LT/LE/GT/GE
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Comparison::Gt | Comparison::Lt | Comparison::Ge | Comparison::Le
        )
    }

    /// Returns true for kinds answered by direct key lookup
    pub fn is_lookup(&self) -> bool {
        matches!(self, Comparison::Eq | Comparison::InArray)
    }

    /// Returns true for kinds evaluated against a collection field
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Comparison::SetHas | Comparison::MapHasKey | Comparison::MapHasValue
        )
    }

    /// The range kind equivalent to `NOT self`
    pub fn negated_range(&self) -> Option<Comparison> {
        match self {
            Comparison::Lt => Some(Comparison::Ge),
            Comparison::Le => Some(Comparison::Gt),
            Comparison::Gt => Some(Comparison::Le),
            Comparison::Ge => Some(Comparison::Lt),
            _ => None,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A predicate bound to one field
pub trait FieldComparator<R>: Send + Sync + fmt::Debug {
    /// The field this comparator reads
    fn field(&self) -> &Field;

    /// The comparison kind
    fn kind(&self) -> Comparison;

    /// Evaluate against a record
    fn compare(&self, record: &R) -> ComparatorResult<bool>;

    /// Evaluate against a field value already extracted from a record
    fn compare_value(&self, value: &Value) -> ComparatorResult<bool>;

    /// Number of operands
    fn values_count(&self) -> usize;

    /// Operand at position `i`
    fn value_at(&self, i: usize) -> Option<&Value>;
}

/// How a comparator reaches the field value inside a record
pub(crate) enum Accessor<R, T> {
    /// Borrow a stored field
    Ref(fn(&R) -> &T),
    /// Compute the value on demand
    Copied(fn(&R) -> T),
}

impl<R, T> Clone for Accessor<R, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, T> Copy for Accessor<R, T> {}

impl<R, T: Clone> Accessor<R, T> {
    pub(crate) fn with<O>(&self, record: &R, f: impl FnOnce(&T) -> O) -> O {
        match self {
            Accessor::Ref(get) => f(get(record)),
            Accessor::Copied(get) => f(&get(record)),
        }
    }

    pub(crate) fn get(&self, record: &R) -> T {
        match self {
            Accessor::Ref(get) => get(record).clone(),
            Accessor::Copied(get) => get(record),
        }
    }
}

/// A typed handle on one scalar field of `R`.
///
/// Produces comparators and sort keys for that field.
pub struct Attribute<R, T> {
    field: Field,
    accessor: Accessor<R, T>,
}

impl<R, T> Clone for Attribute<R, T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            accessor: self.accessor,
        }
    }
}

impl<R, T> fmt::Debug for Attribute<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("field", &self.field)
            .finish()
    }
}

impl<R: Record> Attribute<R, i64> {
    /// The record identifier
    pub fn id() -> Self {
        Self::computed(Field::id(), R::id)
    }
}

impl<R: 'static, T: ScalarValue> Attribute<R, T> {
    /// A stored field, read by reference
    pub fn new(field: Field, getter: fn(&R) -> &T) -> Self {
        Self {
            field,
            accessor: Accessor::Ref(getter),
        }
    }

    /// A derived field, computed per read
    pub fn computed(field: Field, getter: fn(&R) -> T) -> Self {
        Self {
            field,
            accessor: Accessor::Copied(getter),
        }
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Reads the field value from a record
    pub fn read(&self, record: &R) -> T {
        self.accessor.get(record)
    }

    /// Comparator of an arbitrary kind
    pub fn compare(&self, kind: Comparison, values: Vec<Value>) -> ScalarComparator<R, T> {
        ScalarComparator::from_accessor(self.field.clone(), self.accessor, kind, values)
    }

    pub fn eq(&self, value: impl Into<Value>) -> ScalarComparator<R, T> {
        self.compare(Comparison::Eq, vec![value.into()])
    }

    pub fn gt(&self, value: impl Into<Value>) -> ScalarComparator<R, T> {
        self.compare(Comparison::Gt, vec![value.into()])
    }

    pub fn lt(&self, value: impl Into<Value>) -> ScalarComparator<R, T> {
        self.compare(Comparison::Lt, vec![value.into()])
    }

    pub fn ge(&self, value: impl Into<Value>) -> ScalarComparator<R, T> {
        self.compare(Comparison::Ge, vec![value.into()])
    }

    pub fn le(&self, value: impl Into<Value>) -> ScalarComparator<R, T> {
        self.compare(Comparison::Le, vec![value.into()])
    }

    pub fn in_array<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> ScalarComparator<R, T> {
        self.compare(
            Comparison::InArray,
            values.into_iter().map(Into::into).collect(),
        )
    }

    /// Substring match
    pub fn like(&self, needle: impl Into<Value>) -> ScalarComparator<R, T> {
        self.compare(Comparison::Like, vec![needle.into()])
    }

    pub fn regexp(&self, pattern: impl Into<Value>) -> ScalarComparator<R, T> {
        self.compare(Comparison::Regexp, vec![pattern.into()])
    }

    /// Sort key on this field
    pub fn sort(&self, direction: Direction) -> SortKey<R> {
        SortKey::from_accessor(self.field.clone(), direction, self.accessor)
    }

    pub fn asc(&self) -> SortKey<R> {
        self.sort(Direction::Asc)
    }

    pub fn desc(&self) -> SortKey<R> {
        self.sort(Direction::Desc)
    }
}

/// One comparator for every [`ScalarValue`] field type
pub struct ScalarComparator<R, T: ScalarValue> {
    field: Field,
    kind: Comparison,
    values: Vec<Value>,
    typed: Result<Vec<T>, ComparatorError>,
    pattern: Option<Result<Regex, ComparatorError>>,
    accessor: Accessor<R, T>,
}

impl<R: 'static, T: ScalarValue> ScalarComparator<R, T> {
    /// Comparator over a stored field
    pub fn new(field: Field, getter: fn(&R) -> &T, kind: Comparison, values: Vec<Value>) -> Self {
        Self::from_accessor(field, Accessor::Ref(getter), kind, values)
    }

    /// Comparator over a derived field
    pub fn computed(field: Field, getter: fn(&R) -> T, kind: Comparison, values: Vec<Value>) -> Self {
        Self::from_accessor(field, Accessor::Copied(getter), kind, values)
    }

    fn from_accessor(
        field: Field,
        accessor: Accessor<R, T>,
        kind: Comparison,
        values: Vec<Value>,
    ) -> Self {
        let (typed, pattern) = if kind == Comparison::Regexp {
            (Ok(Vec::new()), Some(compile_pattern(&values)))
        } else {
            let typed = values
                .iter()
                .map(|v| T::from_value(v).map_err(ComparatorError::from))
                .collect();
            (typed, None)
        };

        Self {
            field,
            kind,
            values,
            typed,
            pattern,
            accessor,
        }
    }

    fn first<'a>(&self, typed: &'a [T]) -> ComparatorResult<&'a T> {
        typed
            .first()
            .ok_or(ComparatorError::MissingOperand(self.kind))
    }

    fn not_implemented(&self) -> ComparatorError {
        ComparatorError::NotImplemented {
            kind: self.kind,
            type_name: T::TYPE_NAME,
        }
    }

    fn matches(&self, actual: &T) -> ComparatorResult<bool> {
        if self.kind == Comparison::Regexp {
            let text = actual.as_text().ok_or_else(|| self.not_implemented())?;
            return match &self.pattern {
                Some(Ok(re)) => Ok(re.is_match(text)),
                Some(Err(err)) => Err(err.clone()),
                None => Err(ComparatorError::MissingOperand(self.kind)),
            };
        }
        if self.kind.is_collection() {
            return Err(self.not_implemented());
        }

        let typed = self.typed.as_ref().map_err(Clone::clone)?;
        match self.kind {
            Comparison::Eq => Ok(actual == self.first(typed)?),
            Comparison::Gt => Ok(actual > self.first(typed)?),
            Comparison::Lt => Ok(actual < self.first(typed)?),
            Comparison::Ge => Ok(actual >= self.first(typed)?),
            Comparison::Le => Ok(actual <= self.first(typed)?),
            Comparison::InArray => Ok(typed.iter().any(|v| v == actual)),
            Comparison::Like => actual
                .contains(self.first(typed)?)
                .ok_or_else(|| self.not_implemented()),
            _ => Err(self.not_implemented()),
        }
    }
}

fn compile_pattern(values: &[Value]) -> ComparatorResult<Regex> {
    match values.first() {
        Some(Value::Str(pattern)) => {
            Regex::new(pattern).map_err(|e| ComparatorError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        }
        Some(other) => Err(ComparatorError::TypeMismatch(
            crate::schema::ValueError::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            },
        )),
        None => Err(ComparatorError::MissingOperand(Comparison::Regexp)),
    }
}

impl<R, T: ScalarValue> fmt::Debug for ScalarComparator<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarComparator")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .field("values", &self.values)
            .field("type", &T::TYPE_NAME)
            .finish()
    }
}

impl<R: 'static, T: ScalarValue> FieldComparator<R> for ScalarComparator<R, T> {
    fn field(&self) -> &Field {
        &self.field
    }

    fn kind(&self) -> Comparison {
        self.kind
    }

    fn compare(&self, record: &R) -> ComparatorResult<bool> {
        self.accessor.with(record, |actual| self.matches(actual))
    }

    fn compare_value(&self, value: &Value) -> ComparatorResult<bool> {
        let actual = T::from_value(value)?;
        self.matches(&actual)
    }

    fn values_count(&self) -> usize {
        self.values.len()
    }

    fn value_at(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }
}

/// Set abstraction supplied by the record type
pub trait SetLike: Send + Sync {
    type Item: ScalarValue;

    fn has(&self, item: &Self::Item) -> bool;
}

impl<T: ScalarValue + Hash + Eq> SetLike for HashSet<T> {
    type Item = T;

    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
}

impl<T: ScalarValue + Ord> SetLike for BTreeSet<T> {
    type Item = T;

    fn has(&self, item: &T) -> bool {
        self.contains(item)
    }
}

/// Map abstraction supplied by the record type
pub trait MapLike: Send + Sync {
    type Key: ScalarValue;
    type Val: ScalarValue;

    fn has_key(&self, key: &Self::Key) -> bool;

    fn has_value(&self, value: &Self::Val) -> bool;
}

impl<K: ScalarValue + Hash + Eq, V: ScalarValue> MapLike for HashMap<K, V> {
    type Key = K;
    type Val = V;

    fn has_key(&self, key: &K) -> bool {
        self.contains_key(key)
    }

    fn has_value(&self, value: &V) -> bool {
        self.values().any(|v| v == value)
    }
}

impl<K: ScalarValue + Ord, V: ScalarValue> MapLike for BTreeMap<K, V> {
    type Key = K;
    type Val = V;

    fn has_key(&self, key: &K) -> bool {
        self.contains_key(key)
    }

    fn has_value(&self, value: &V) -> bool {
        self.values().any(|v| v == value)
    }
}

/// `SetHas`: true when the set holds any of the operands
pub struct SetComparator<R, S: SetLike> {
    field: Field,
    getter: fn(&R) -> &S,
    values: Vec<Value>,
    typed: Result<Vec<S::Item>, ComparatorError>,
}

impl<R, S: SetLike> SetComparator<R, S> {
    pub fn new(field: Field, getter: fn(&R) -> &S, values: Vec<Value>) -> Self {
        let typed = values
            .iter()
            .map(|v| S::Item::from_value(v).map_err(ComparatorError::from))
            .collect();
        Self {
            field,
            getter,
            values,
            typed,
        }
    }
}

impl<R, S: SetLike> fmt::Debug for SetComparator<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetComparator")
            .field("field", &self.field)
            .field("values", &self.values)
            .finish()
    }
}

impl<R: 'static, S: SetLike + 'static> FieldComparator<R> for SetComparator<R, S> {
    fn field(&self) -> &Field {
        &self.field
    }

    fn kind(&self) -> Comparison {
        Comparison::SetHas
    }

    fn compare(&self, record: &R) -> ComparatorResult<bool> {
        let typed = self.typed.as_ref().map_err(Clone::clone)?;
        let set = (self.getter)(record);
        Ok(typed.iter().any(|item| set.has(item)))
    }

    fn compare_value(&self, _value: &Value) -> ComparatorResult<bool> {
        Err(ComparatorError::NotImplemented {
            kind: Comparison::SetHas,
            type_name: S::Item::TYPE_NAME,
        })
    }

    fn values_count(&self) -> usize {
        self.values.len()
    }

    fn value_at(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }
}

/// `MapHasKey` / `MapHasValue`: true when the map holds any of the operands
pub struct MapComparator<R, M: MapLike> {
    field: Field,
    kind: Comparison,
    getter: fn(&R) -> &M,
    values: Vec<Value>,
    keys: Result<Vec<M::Key>, ComparatorError>,
    vals: Result<Vec<M::Val>, ComparatorError>,
}

impl<R, M: MapLike> MapComparator<R, M> {
    pub fn has_key(field: Field, getter: fn(&R) -> &M, values: Vec<Value>) -> Self {
        let keys = values
            .iter()
            .map(|v| M::Key::from_value(v).map_err(ComparatorError::from))
            .collect();
        Self {
            field,
            kind: Comparison::MapHasKey,
            getter,
            values,
            keys,
            vals: Ok(Vec::new()),
        }
    }

    pub fn has_value(field: Field, getter: fn(&R) -> &M, values: Vec<Value>) -> Self {
        let vals = values
            .iter()
            .map(|v| M::Val::from_value(v).map_err(ComparatorError::from))
            .collect();
        Self {
            field,
            kind: Comparison::MapHasValue,
            getter,
            values,
            keys: Ok(Vec::new()),
            vals,
        }
    }
}

impl<R, M: MapLike> fmt::Debug for MapComparator<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapComparator")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .field("values", &self.values)
            .finish()
    }
}

impl<R: 'static, M: MapLike + 'static> FieldComparator<R> for MapComparator<R, M> {
    fn field(&self) -> &Field {
        &self.field
    }

    fn kind(&self) -> Comparison {
        self.kind
    }

    fn compare(&self, record: &R) -> ComparatorResult<bool> {
        let map = (self.getter)(record);
        if self.kind == Comparison::MapHasKey {
            let keys = self.keys.as_ref().map_err(Clone::clone)?;
            Ok(keys.iter().any(|k| map.has_key(k)))
        } else {
            let vals = self.vals.as_ref().map_err(Clone::clone)?;
            Ok(vals.iter().any(|v| map.has_value(v)))
        }
    }

    fn compare_value(&self, _value: &Value) -> ComparatorResult<bool> {
        Err(ComparatorError::NotImplemented {
            kind: self.kind,
            type_name: M::Key::TYPE_NAME,
        })
    }

    fn values_count(&self) -> usize {
        self.values.len()
    }

    fn value_at(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }
}
