//! TTL table: tracks each key's expiry so the background driver can sweep
//! expired keys without scanning the whole Index.
//!
//! Grounded on the same shape as a sorted expiry-to-keys index: a
//! `BTreeMap<expiry, Set<key>>` gives `find_expired` an O(expired count)
//! range query instead of O(total keys). A parallel `key -> expiry` map lets
//! `insert` find and remove a key's previous entry when its TTL changes.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Maps keys to their expiry timestamps (Unix milliseconds), sorted for
/// efficient "what has expired by now" queries.
#[derive(Debug, Default)]
pub struct TtlTable {
    by_expiry: BTreeMap<i64, HashSet<String>>,
    by_key: HashMap<String, i64>,
}

impl TtlTable {
    /// Create an empty TTL table.
    pub fn new() -> Self {
        TtlTable {
            by_expiry: BTreeMap::new(),
            by_key: HashMap::new(),
        }
    }

    /// Schedule (or reschedule) `key` to expire at `expiry_ms`. Any prior
    /// expiry for this key is removed first.
    pub fn insert(&mut self, key: impl Into<String>, expiry_ms: i64) {
        let key = key.into();
        self.remove(&key);
        self.by_expiry
            .entry(expiry_ms)
            .or_default()
            .insert(key.clone());
        self.by_key.insert(key, expiry_ms);
    }

    /// Cancel `key`'s TTL, if any.
    pub fn remove(&mut self, key: &str) {
        if let Some(expiry) = self.by_key.remove(key) {
            if let Some(keys) = self.by_expiry.get_mut(&expiry) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_expiry.remove(&expiry);
                }
            }
        }
    }

    /// True if `key` currently has a scheduled TTL.
    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// The expiry timestamp currently scheduled for `key`, if any.
    pub fn expiry_of(&self, key: &str) -> Option<i64> {
        self.by_key.get(key).copied()
    }

    /// All keys whose expiry is `<= now_ms`, in no particular order.
    pub fn find_expired(&self, now_ms: i64) -> Vec<String> {
        self.by_expiry
            .range(..=now_ms)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Number of keys with a scheduled TTL.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// True if no key has a scheduled TTL.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Remove every scheduled TTL.
    pub fn clear(&mut self) {
        self.by_expiry.clear();
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_expired() {
        let mut ttl = TtlTable::new();
        ttl.insert("a", 100);
        ttl.insert("b", 200);
        ttl.insert("c", 300);

        let expired = ttl.find_expired(200);
        assert_eq!(expired.len(), 2);
        assert!(expired.contains(&"a".to_string()));
        assert!(expired.contains(&"b".to_string()));
    }

    #[test]
    fn reinserting_a_key_replaces_its_old_expiry() {
        let mut ttl = TtlTable::new();
        ttl.insert("a", 100);
        ttl.insert("a", 500);
        assert_eq!(ttl.expiry_of("a"), Some(500));
        assert!(ttl.find_expired(100).is_empty());
        assert_eq!(ttl.find_expired(500), vec!["a".to_string()]);
    }

    #[test]
    fn remove_clears_key_and_prunes_empty_timestamp_bucket() {
        let mut ttl = TtlTable::new();
        ttl.insert("a", 100);
        ttl.remove("a");
        assert!(!ttl.contains("a"));
        assert!(ttl.is_empty());
    }

    #[test]
    fn find_expired_excludes_future_keys() {
        let mut ttl = TtlTable::new();
        ttl.insert("future", 1_000_000);
        assert!(ttl.find_expired(100).is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let mut ttl = TtlTable::new();
        ttl.insert("a", 100);
        ttl.insert("b", 200);
        ttl.clear();
        assert!(ttl.is_empty());
        assert_eq!(ttl.len(), 0);
    }
}
