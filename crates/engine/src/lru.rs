//! Bounded read cache with LRU eviction.
//!
//! Implemented as an index-based doubly linked list over a `Vec<Node>` slab
//! plus a `HashMap<key, slab index>`, per the design note that a naive
//! sequence-with-linear-scan is only acceptable for tiny caps. All of
//! `get`/`insert`/`remove` are O(1).

use haven_core::Value;
use std::collections::HashMap;

struct Node {
    key: String,
    value: Value,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A cache of decoded values bounded by an optional key count, evicting the
/// least-recently-used entry on overflow. Eviction only removes from this
/// cache — callers are responsible for the Index, which is unaffected.
pub struct LruCache {
    capacity: Option<usize>,
    slots: Vec<Option<Node>>,
    index: HashMap<String, usize>,
    head: Option<usize>, // most recently used
    tail: Option<usize>, // least recently used
    free: Vec<usize>,
}

impl LruCache {
    /// Create a cache bounded by `capacity` keys, or unbounded if `None`.
    pub fn new(capacity: Option<usize>) -> Self {
        LruCache {
            capacity,
            slots: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            free: Vec::new(),
        }
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True if `key` is cached, without affecting recency.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Look up a value and mark it most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.slots[idx].as_ref().map(|n| &n.value)
    }

    /// Look up a value without affecting recency.
    pub fn peek(&self, key: &str) -> Option<&Value> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|n| &n.value)
    }

    /// Insert or overwrite `key`, marking it most-recently-used. If the
    /// cache is over capacity afterward, evicts and returns the
    /// least-recently-used `(key, value)` pair (which may be the entry just
    /// inserted, for a zero-capacity cache).
    pub fn insert(&mut self, key: String, value: Value) -> Option<(String, Value)> {
        if let Some(&idx) = self.index.get(&key) {
            self.slots[idx].as_mut().unwrap().value = value;
            self.move_to_front(idx);
        } else {
            let idx = self.alloc(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.index.insert(key, idx);
            self.push_front(idx);
        }

        match self.capacity {
            Some(cap) if self.index.len() > cap => self.evict_lru(),
            _ => None,
        }
    }

    /// Remove `key`, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        let node = self.free_slot(idx);
        Some(node.value)
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.free.clear();
    }

    fn evict_lru(&mut self) -> Option<(String, Value)> {
        let idx = self.tail?;
        self.unlink(idx);
        let node = self.free_slot(idx);
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn free_slot(&mut self, idx: usize) -> Node {
        self.free.push(idx);
        self.slots[idx].take().expect("slot must be occupied")
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.slots[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.slots[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.slots[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }
}
