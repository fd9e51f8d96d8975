//! Arena-backed B-tree
//!
//! Nodes live in a `Vec` and refer to children by position, so there are
//! no parent pointers and no ownership cycles. Splits propagate upward on
//! the way back out of the recursive insert.
//!
//! # Invariants
//!
//! - A node holds at most `max_children - 1` entries
//! - An internal node has exactly `entries + 1` children
//! - Keys within a node are strictly increasing under `less`
//! - Entries are never removed

use std::cmp::Ordering;
use std::fmt;

use crate::schema::ScalarValue;

/// Strict ordering used by the tree
pub type Less<K> = fn(&K, &K) -> bool;

/// `a < b` under `PartialOrd`
pub fn natural_less<K: PartialOrd>(a: &K, b: &K) -> bool {
    a < b
}

/// `a < b` under [`ScalarValue::key_cmp`], total even for floats
pub fn scalar_less<K: ScalarValue>(a: &K, b: &K) -> bool {
    a.key_cmp(b) == Ordering::Less
}

/// Smallest legal order
pub const MIN_MAX_CHILDREN: usize = 3;

struct Node<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    children: Vec<usize>,
}

impl<K, V> Node<K, V> {
    fn leaf() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

enum Insert<K, V> {
    Inserted,
    Replaced(V),
    /// Promoted entry and the new right sibling
    Split(K, V, usize),
}

/// Order-`M` B-tree mapping keys to values
pub struct BTree<K, V> {
    nodes: Vec<Node<K, V>>,
    root: usize,
    max_children: usize,
    less: Less<K>,
    len: usize,
}

impl<K: PartialOrd, V> BTree<K, V> {
    /// Tree ordered by `PartialOrd`
    pub fn new(max_children: usize) -> Self {
        Self::with_less(max_children, natural_less::<K>)
    }
}

impl<K, V> BTree<K, V> {
    /// Tree ordered by `less`. Orders below 3 are raised to 3.
    pub fn with_less(max_children: usize, less: Less<K>) -> Self {
        Self {
            nodes: vec![Node::leaf()],
            root: 0,
            max_children: max_children.max(MIN_MAX_CHILDREN),
            less,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_children(&self) -> usize {
        self.max_children
    }

    /// First position whose key is not less than `key`
    fn lower_bound(&self, node: usize, key: &K) -> usize {
        let less = self.less;
        self.nodes[node].keys.partition_point(|k| less(k, key))
    }

    /// First position whose key is greater than `key`
    fn upper_bound(&self, node: usize, key: &K) -> usize {
        let less = self.less;
        self.nodes[node].keys.partition_point(|k| !less(key, k))
    }

    fn equal_at(&self, node: usize, pos: usize, key: &K) -> bool {
        self.nodes[node]
            .keys
            .get(pos)
            .is_some_and(|k| !(self.less)(key, k))
    }

    /// Point lookup
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut node = self.root;
        loop {
            let pos = self.lower_bound(node, key);
            if self.equal_at(node, pos, key) {
                return self.nodes[node].values.get(pos);
            }
            if self.nodes[node].is_leaf() {
                return None;
            }
            node = self.nodes[node].children[pos];
        }
    }

    /// Inserts or replaces. Returns the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.insert_into(self.root, key, value) {
            Insert::Replaced(old) => Some(old),
            Insert::Inserted => {
                self.len += 1;
                None
            }
            Insert::Split(key, value, right) => {
                let root = Node {
                    keys: vec![key],
                    values: vec![value],
                    children: vec![self.root, right],
                };
                self.nodes.push(root);
                self.root = self.nodes.len() - 1;
                self.len += 1;
                None
            }
        }
    }

    /// Returns the value for `key`, inserting `make()` first if absent
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &V
    where
        K: Clone,
    {
        if self.get(&key).is_none() {
            self.insert(key.clone(), make());
        }
        let mut node = self.root;
        loop {
            let pos = self.lower_bound(node, &key);
            if self.equal_at(node, pos, &key) || self.nodes[node].is_leaf() {
                return &self.nodes[node].values[pos];
            }
            node = self.nodes[node].children[pos];
        }
    }

    fn insert_into(&mut self, node: usize, key: K, value: V) -> Insert<K, V> {
        let pos = self.lower_bound(node, &key);
        if self.equal_at(node, pos, &key) {
            let old = std::mem::replace(&mut self.nodes[node].values[pos], value);
            return Insert::Replaced(old);
        }

        if self.nodes[node].is_leaf() {
            let n = &mut self.nodes[node];
            n.keys.insert(pos, key);
            n.values.insert(pos, value);
        } else {
            let child = self.nodes[node].children[pos];
            match self.insert_into(child, key, value) {
                Insert::Split(key, value, right) => {
                    let n = &mut self.nodes[node];
                    n.keys.insert(pos, key);
                    n.values.insert(pos, value);
                    n.children.insert(pos + 1, right);
                }
                done => return done,
            }
        }

        if self.nodes[node].keys.len() > self.max_children - 1 {
            self.split(node)
        } else {
            Insert::Inserted
        }
    }

    /// Moves the upper half into a new sibling and promotes the middle entry
    fn split(&mut self, node: usize) -> Insert<K, V> {
        let n = &mut self.nodes[node];
        let mid = n.keys.len() / 2;

        let keys = n.keys.split_off(mid + 1);
        let values = n.values.split_off(mid + 1);
        let children = if n.is_leaf() {
            Vec::new()
        } else {
            n.children.split_off(mid + 1)
        };
        let (Some(key), Some(value)) = (n.keys.pop(), n.values.pop()) else {
            return Insert::Inserted;
        };

        self.nodes.push(Node {
            keys,
            values,
            children,
        });
        Insert::Split(key, value, self.nodes.len() - 1)
    }

    /// Visits entries in ascending order.
    ///
    /// `start` is `(key, inclusive)`; `stop` is exclusive. Traversal ends
    /// at the stop bound or when `visit` returns false.
    pub fn ascend(
        &self,
        start: Option<(&K, bool)>,
        stop: Option<&K>,
        mut visit: impl FnMut(&K, &V) -> bool,
    ) {
        self.ascend_node(self.root, start, stop, &mut visit);
    }

    fn ascend_node(
        &self,
        node: usize,
        start: Option<(&K, bool)>,
        stop: Option<&K>,
        visit: &mut impl FnMut(&K, &V) -> bool,
    ) -> bool {
        let n = &self.nodes[node];
        let from = match start {
            None => 0,
            Some((key, true)) => self.lower_bound(node, key),
            Some((key, false)) => self.upper_bound(node, key),
        };

        for i in from..n.keys.len() {
            if !n.is_leaf() && !self.ascend_node(n.children[i], start, stop, visit) {
                return false;
            }
            let key = &n.keys[i];
            if stop.is_some_and(|s| !(self.less)(key, s)) {
                return false;
            }
            if !visit(key, &n.values[i]) {
                return false;
            }
        }

        if n.is_leaf() {
            true
        } else {
            self.ascend_node(n.children[n.keys.len()], start, stop, visit)
        }
    }

    /// Visits entries in descending order. Mirror of [`BTree::ascend`].
    pub fn descend(
        &self,
        start: Option<(&K, bool)>,
        stop: Option<&K>,
        mut visit: impl FnMut(&K, &V) -> bool,
    ) {
        self.descend_node(self.root, start, stop, &mut visit);
    }

    fn descend_node(
        &self,
        node: usize,
        start: Option<(&K, bool)>,
        stop: Option<&K>,
        visit: &mut impl FnMut(&K, &V) -> bool,
    ) -> bool {
        let n = &self.nodes[node];
        let to = match start {
            None => n.keys.len(),
            Some((key, true)) => self.upper_bound(node, key),
            Some((key, false)) => self.lower_bound(node, key),
        };

        if !n.is_leaf() && !self.descend_node(n.children[to], start, stop, visit) {
            return false;
        }
        for i in (0..to).rev() {
            let key = &n.keys[i];
            if stop.is_some_and(|s| !(self.less)(s, key)) {
                return false;
            }
            if !visit(key, &n.values[i]) {
                return false;
            }
            if !n.is_leaf() && !self.descend_node(n.children[i], start, stop, visit) {
                return false;
            }
        }
        true
    }

    /// Visits every entry in ascending order
    pub fn for_each(&self, mut visit: impl FnMut(&K, &V)) {
        self.ascend(None, None, |k, v| {
            visit(k, v);
            true
        });
    }

    /// Number of levels from root to leaf
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = self.root;
        while let Some(&child) = self.nodes[node].children.first() {
            height += 1;
            node = child;
        }
        height
    }
}

impl<K: fmt::Debug, V> fmt::Debug for BTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree")
            .field("len", &self.len)
            .field("max_children", &self.max_children)
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(order: usize, keys: impl IntoIterator<Item = i64>) -> BTree<i64, i64> {
        let mut t = BTree::new(order);
        for k in keys {
            t.insert(k, k * 10);
        }
        t
    }

    fn ascend(t: &BTree<i64, i64>, start: Option<(i64, bool)>, stop: Option<i64>) -> Vec<i64> {
        let mut out = Vec::new();
        t.ascend(start.as_ref().map(|(k, i)| (k, *i)), stop.as_ref(), |k, _| {
            out.push(*k);
            true
        });
        out
    }

    fn descend(t: &BTree<i64, i64>, start: Option<(i64, bool)>, stop: Option<i64>) -> Vec<i64> {
        let mut out = Vec::new();
        t.descend(start.as_ref().map(|(k, i)| (k, *i)), stop.as_ref(), |k, _| {
            out.push(*k);
            true
        });
        out
    }

    /// Checks node sizes, child counts and key order
    fn check(t: &BTree<i64, i64>) {
        fn walk(t: &BTree<i64, i64>, node: usize, depth: usize, leaves: &mut Vec<usize>) {
            let n = &t.nodes[node];
            assert!(n.keys.len() <= t.max_children - 1);
            assert!(n.keys.windows(2).all(|w| w[0] < w[1]));
            if n.is_leaf() {
                leaves.push(depth);
            } else {
                assert_eq!(n.children.len(), n.keys.len() + 1);
                for &c in &n.children {
                    walk(t, c, depth + 1, leaves);
                }
            }
        }
        let mut leaves = Vec::new();
        walk(t, t.root, 0, &mut leaves);
        assert!(leaves.windows(2).all(|w| w[0] == w[1]), "unbalanced");
    }

    #[test]
    fn test_insert_and_lookup() {
        let t = tree(4, [5, 1, 9, 3, 7, 2, 8, 6, 4]);
        assert_eq!(t.len(), 9);
        assert_eq!(t.get(&7), Some(&70));
        assert_eq!(t.get(&10), None);
        check(&t);
    }

    #[test]
    fn test_replace_keeps_len() {
        let mut t = tree(3, 1..=10);
        assert_eq!(t.insert(4, 0), Some(40));
        assert_eq!(t.len(), 10);
        assert_eq!(t.get(&4), Some(&0));
    }

    #[test]
    fn test_splits_stay_balanced() {
        for order in [3, 4, 5, 32] {
            let keys: Vec<i64> = (0..500).map(|i| (i * 7919) % 1009).collect();
            let t = tree(order, keys.iter().copied());
            check(&t);
            assert_eq!(t.len(), 500);
            assert!(keys.iter().all(|k| t.get(k) == Some(&(k * 10))));
        }
        assert!(tree(3, 0..100).height() > 1);
        assert_eq!(tree(32, 0..10).height(), 1);
    }

    #[test]
    fn test_order_is_clamped() {
        let t: BTree<i64, i64> = BTree::new(1);
        assert_eq!(t.max_children(), MIN_MAX_CHILDREN);
    }

    #[test]
    fn test_lookup_range() {
        let t = tree(3, 1..=20);

        // LT 5
        assert_eq!(ascend(&t, None, Some(5)), vec![1, 2, 3, 4]);
        // GE 17
        assert_eq!(ascend(&t, Some((17, true)), None), vec![17, 18, 19, 20]);
        // LE 3
        assert_eq!(descend(&t, Some((3, true)), None), vec![3, 2, 1]);
        // GT 18
        assert_eq!(descend(&t, None, Some(18)), vec![20, 19]);
        // exclusive start
        assert_eq!(ascend(&t, Some((18, false)), None), vec![19, 20]);
        assert_eq!(descend(&t, Some((3, false)), None), vec![2, 1]);
        // bounded both sides
        assert_eq!(ascend(&t, Some((5, true)), Some(8)), vec![5, 6, 7]);
    }

    #[test]
    fn test_ranges_on_missing_keys() {
        let t = tree(4, (0..50).map(|i| i * 2));
        assert_eq!(ascend(&t, None, Some(5)), vec![0, 2, 4]);
        assert_eq!(descend(&t, Some((5, true)), None), vec![4, 2, 0]);
        assert_eq!(ascend(&t, Some((95, true)), None), vec![96, 98]);
        assert_eq!(descend(&t, None, Some(95)), vec![98, 96]);
    }

    #[test]
    fn test_traversal_stops_early() {
        let t = tree(3, 1..=1000);
        let mut visited = 0;
        t.ascend(None, Some(&4), |_, _| {
            visited += 1;
            true
        });
        assert_eq!(visited, 3);

        let mut visited = 0;
        t.descend(None, None, |_, _| {
            visited += 1;
            visited < 5
        });
        assert_eq!(visited, 5);
    }

    #[test]
    fn test_custom_less() {
        let mut t: BTree<i64, ()> = BTree::with_less(3, |a, b| a > b);
        for k in 1..=10 {
            t.insert(k, ());
        }
        let mut out = Vec::new();
        t.for_each(|k, _| out.push(*k));
        assert_eq!(out, (1..=10).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut t: BTree<i64, i64> = BTree::new(3);
        assert_eq!(*t.get_or_insert_with(5, || 50), 50);
        assert_eq!(*t.get_or_insert_with(5, || 99), 50);
        for k in 0..40 {
            t.get_or_insert_with(k, || k);
        }
        assert_eq!(t.len(), 40);
        assert_eq!(*t.get_or_insert_with(5, || 0), 50);
    }
}
