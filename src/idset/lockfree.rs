//! Lock-free identifier set for hot, non-unique buckets
//!
//! A singly linked list sorted by `mix64(id)` plus an array of search
//! accelerators pointing partway into the list.
//!
//! # Layout
//!
//! - Nodes live in a segmented, append-only arena and are addressed by
//!   index. Segment `k` holds `BASE << k` nodes and is allocated on first use.
//! - A link packs `(index << 1) | deleted`. Index 0 is the head sentinel, so
//!   a link to index 0 means "end of list".
//! - Deletion marks the node's own link first, then unlinks it. Traversals
//!   unlink marked nodes they pass.
//! - Accelerator level `k` has `2^k` slots; slot `s` points at a node whose
//!   hash has `s` as its top `k` bits. When the set holds more than half as
//!   many ids as there are slots, one thread builds the next level from the
//!   live list and publishes it.
//!
//! # Invariants
//!
//! - `mix64` is a bijection with `mix64(0) == 0`, so ids never collide and
//!   only the head has hash 0
//! - Node hash and id never change after the node is published
//! - Nodes are never reclaimed; a marked node stays marked

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

const BASE_SHIFT: u32 = 6;
const SEGMENTS: usize = 40;
const LEVELS: usize = 32;
const INITIAL_LEVEL: usize = 4;
/// Lower accelerator slots tried before falling back to the head
const PROBES: usize = 3;
const HEAD: u64 = 0;
const MARK: u64 = 1;

/// splitmix64 finalizer
pub(crate) fn mix64(id: i64) -> u64 {
    let mut z = id as u64;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[inline]
fn pack(index: u64) -> u64 {
    index << 1
}

#[inline]
fn target(link: u64) -> u64 {
    link >> 1
}

#[inline]
fn is_marked(link: u64) -> bool {
    link & MARK != 0
}

#[derive(Default)]
struct Node {
    hash: AtomicU64,
    id: AtomicI64,
    next: AtomicU64,
}

/// Locates segment and offset for a node index
#[inline]
fn locate(index: u64) -> (usize, usize) {
    let j = (index >> BASE_SHIFT) + 1;
    let segment = (63 - j.leading_zeros()) as usize;
    let start = ((1u64 << segment) - 1) << BASE_SHIFT;
    (segment, (index - start) as usize)
}

fn new_segment(segment: usize) -> Box<[Node]> {
    (0..(1usize << (segment + BASE_SHIFT as usize)))
        .map(|_| Node::default())
        .collect()
}

fn new_level(level: usize) -> Box<[AtomicU64]> {
    (0..(1usize << level)).map(|_| AtomicU64::new(HEAD)).collect()
}

#[inline]
fn slot_of(hash: u64, level: usize) -> usize {
    if level == 0 {
        0
    } else {
        (hash >> (64 - level)) as usize
    }
}

/// Lock-free set of identifiers
pub struct LockFreeIdSet {
    segments: [OnceLock<Box<[Node]>>; SEGMENTS],
    allocated: AtomicU64,
    levels: [OnceLock<Box<[AtomicU64]>>; LEVELS],
    level: AtomicUsize,
    growing: AtomicBool,
    len: AtomicUsize,
}

impl Default for LockFreeIdSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockFreeIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeIdSet")
            .field("len", &self.count())
            .field("level", &self.level())
            .finish()
    }
}

impl LockFreeIdSet {
    pub fn new() -> Self {
        let set = Self {
            segments: std::array::from_fn(|_| OnceLock::new()),
            // index 0 is the head sentinel
            allocated: AtomicU64::new(1),
            levels: std::array::from_fn(|_| OnceLock::new()),
            level: AtomicUsize::new(INITIAL_LEVEL),
            growing: AtomicBool::new(false),
            len: AtomicUsize::new(0),
        };
        let _ = set.levels[INITIAL_LEVEL].set(new_level(INITIAL_LEVEL));
        set
    }

    fn node(&self, index: u64) -> &Node {
        let (segment, offset) = locate(index);
        &self.segments[segment].get_or_init(|| new_segment(segment))[offset]
    }

    fn allocate(&self, hash: u64, id: i64) -> Option<u64> {
        let index = self.allocated.fetch_add(1, Ordering::Relaxed);
        if locate(index).0 >= SEGMENTS {
            return None;
        }
        let node = self.node(index);
        node.hash.store(hash, Ordering::Relaxed);
        node.id.store(id, Ordering::Relaxed);
        Some(index)
    }

    /// Current accelerator level
    pub(crate) fn level(&self) -> usize {
        self.level.load(Ordering::Acquire)
    }

    /// Best starting node for `hash`: a live node with a smaller hash
    fn start(&self, hash: u64) -> u64 {
        let level = self.level();
        let Some(slots) = self.levels[level].get() else {
            return HEAD;
        };
        let slot = slot_of(hash, level);
        for s in (slot.saturating_sub(PROBES)..=slot).rev() {
            let index = slots[s].load(Ordering::Acquire);
            if index == HEAD {
                continue;
            }
            let node = self.node(index);
            if node.hash.load(Ordering::Relaxed) < hash
                && !is_marked(node.next.load(Ordering::Acquire))
            {
                return index;
            }
        }
        HEAD
    }

    /// Returns `(prev, curr)` with `prev.hash < hash <= curr.hash`, unlinking
    /// marked nodes on the way. `curr` is `HEAD` at the end of the list.
    fn find(&self, hash: u64) -> (u64, u64) {
        let mut from = self.start(hash);
        'retry: loop {
            let mut prev = from;
            let mut link = self.node(prev).next.load(Ordering::Acquire);
            if is_marked(link) {
                from = HEAD;
                continue 'retry;
            }

            loop {
                let curr = target(link);
                if curr == HEAD {
                    return (prev, HEAD);
                }
                let node = self.node(curr);
                let next = node.next.load(Ordering::Acquire);

                if is_marked(next) {
                    let unlinked = pack(target(next));
                    if self
                        .node(prev)
                        .next
                        .compare_exchange(link, unlinked, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        from = HEAD;
                        continue 'retry;
                    }
                    link = unlinked;
                    continue;
                }

                if node.hash.load(Ordering::Relaxed) >= hash {
                    return (prev, curr);
                }
                prev = curr;
                link = next;
            }
        }
    }

    /// Adds `id`. Returns false if it was already present.
    pub fn add(&self, id: i64) -> bool {
        let hash = mix64(id);
        let mut fresh = None;

        loop {
            let (prev, curr) = self.find(hash);
            if curr != HEAD && self.node(curr).hash.load(Ordering::Relaxed) == hash {
                return false;
            }

            let index = match fresh {
                Some(index) => index,
                None => match self.allocate(hash, id) {
                    Some(index) => {
                        fresh = Some(index);
                        index
                    }
                    // arena exhausted
                    None => return false,
                },
            };
            self.node(index).next.store(pack(curr), Ordering::Relaxed);

            if self
                .node(prev)
                .next
                .compare_exchange(pack(curr), pack(index), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let len = self.len.fetch_add(1, Ordering::Relaxed) + 1;
                self.accelerate(hash, index);
                self.maybe_grow(len);
                return true;
            }
        }
    }

    /// Removes `id`. Returns false if it was absent.
    pub fn delete(&self, id: i64) -> bool {
        let hash = mix64(id);

        loop {
            let (prev, curr) = self.find(hash);
            if curr == HEAD {
                return false;
            }
            let node = self.node(curr);
            if node.hash.load(Ordering::Relaxed) != hash {
                return false;
            }

            let next = node.next.load(Ordering::Acquire);
            if is_marked(next) {
                continue;
            }
            if node
                .next
                .compare_exchange(next, next | MARK, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            self.len.fetch_sub(1, Ordering::Relaxed);
            let _ = self.node(prev).next.compare_exchange(
                pack(curr),
                pack(target(next)),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return true;
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        let hash = mix64(id);
        let mut index = target(self.node(self.start(hash)).next.load(Ordering::Acquire));

        while index != HEAD {
            let node = self.node(index);
            let node_hash = node.hash.load(Ordering::Relaxed);
            let next = node.next.load(Ordering::Acquire);
            if node_hash > hash {
                return false;
            }
            if node_hash == hash {
                return !is_marked(next);
            }
            index = target(next);
        }
        false
    }

    pub fn count(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Visits every live identifier in hash order
    pub fn for_each(&self, mut f: impl FnMut(i64)) {
        let mut index = target(self.node(HEAD).next.load(Ordering::Acquire));
        while index != HEAD {
            let node = self.node(index);
            let next = node.next.load(Ordering::Acquire);
            if !is_marked(next) {
                f(node.id.load(Ordering::Relaxed));
            }
            index = target(next);
        }
    }

    /// Points the slot for `hash` at a freshly linked node when that is an
    /// improvement over what the slot holds.
    fn accelerate(&self, hash: u64, index: u64) {
        let level = self.level();
        let Some(slots) = self.levels[level].get() else {
            return;
        };
        let slot = &slots[slot_of(hash, level)];
        let current = slot.load(Ordering::Acquire);
        let replace = current == HEAD || {
            let node = self.node(current);
            is_marked(node.next.load(Ordering::Acquire))
                || node.hash.load(Ordering::Relaxed) > hash
        };
        if replace {
            let _ = slot.compare_exchange(current, index, Ordering::AcqRel, Ordering::Acquire);
        }
    }

    fn maybe_grow(&self, len: usize) {
        let level = self.level();
        if level + 1 >= LEVELS || len <= (1usize << level) / 2 {
            return;
        }
        if self
            .growing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        // Another grower may have finished between the load and the guard.
        if self.level() == level {
            let next_level = level + 1;
            let slots = new_level(next_level);
            let mut index = target(self.node(HEAD).next.load(Ordering::Acquire));
            while index != HEAD {
                let node = self.node(index);
                let next = node.next.load(Ordering::Acquire);
                if !is_marked(next) {
                    let slot = &slots[slot_of(node.hash.load(Ordering::Relaxed), next_level)];
                    if slot.load(Ordering::Relaxed) == HEAD {
                        slot.store(index, Ordering::Relaxed);
                    }
                }
                index = target(next);
            }
            if self.levels[next_level].set(slots).is_ok() {
                self.level.store(next_level, Ordering::Release);
            }
        }

        self.growing.store(false, Ordering::Release);
    }
}
