//! The Keyspace
//!
//! A [`Db`] is one logical database: a key → value dictionary plus a
//! parallel key → deadline mapping for keys that expire. The two maps
//! are independent: a key with no entry in the expires map is
//! persistent.
//!
//! ## Expiration
//!
//! Deadlines are absolute unix-epoch milliseconds. Keys past their
//! deadline are removed in two ways:
//!
//! 1. **Lazy**: every access path calls [`Db::expire_if_needed`] first,
//!    so a dead key is never observable, no matter how rarely the
//!    active sweep runs.
//! 2. **Active**: the expiration cycle calls [`Db::sample_expired`] to
//!    randomly probe the expires map and delete what it finds, so
//!    memory is reclaimed even for keys nobody reads again.
//!
//! Callers pass `now` explicitly; this keeps every expiration decision
//! deterministic under test.

use crate::storage::Value;
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::collections::HashMap;

/// One logical database.
#[derive(Debug, Default)]
pub struct Db {
    /// Database index, for logging and SELECT bounds checks.
    id: usize,
    /// The keyspace proper.
    dict: HashMap<Bytes, Value>,
    /// Absolute deadline (unix ms) per expiring key.
    expires: HashMap<Bytes, u64>,
}

impl Db {
    /// Creates an empty database with the given index.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            dict: HashMap::new(),
            expires: HashMap::new(),
        }
    }

    /// The database index.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Looks up a key, applying lazy expiration first.
    pub fn lookup(&mut self, key: &[u8], now: u64) -> Option<&Value> {
        self.expire_if_needed(key, now);
        self.dict.get(key)
    }

    /// Mutable lookup, applying lazy expiration first.
    pub fn lookup_mut(&mut self, key: &[u8], now: u64) -> Option<&mut Value> {
        self.expire_if_needed(key, now);
        self.dict.get_mut(key)
    }

    /// Whether a live (non-expired) entry exists for `key`.
    pub fn contains(&mut self, key: &[u8], now: u64) -> bool {
        self.expire_if_needed(key, now);
        self.dict.contains_key(key)
    }

    /// High-level SET: associates `key` with `value` whether or not the
    /// key already exists, and removes any deadline. An overwritten
    /// key is persistent until EXPIRE is issued again.
    pub fn set_key(&mut self, key: Bytes, value: Value) {
        self.expires.remove(&key);
        self.dict.insert(key, value);
    }

    /// Removes a key, its value, and its deadline. Returns whether a
    /// live entry was actually removed.
    pub fn remove(&mut self, key: &[u8], now: u64) -> bool {
        self.expire_if_needed(key, now);
        self.expires.remove(key);
        self.dict.remove(key).is_some()
    }

    /// Sets the absolute deadline for an existing key.
    pub fn set_expire(&mut self, key: Bytes, deadline: u64) {
        self.expires.insert(key, deadline);
    }

    /// The deadline for a live key, if one is set.
    pub fn expire_deadline(&mut self, key: &[u8], now: u64) -> Option<u64> {
        self.expire_if_needed(key, now);
        self.expires.get(key).copied()
    }

    /// Makes a key persistent. Returns whether a deadline was removed.
    pub fn remove_expire(&mut self, key: &[u8]) -> bool {
        self.expires.remove(key).is_some()
    }

    /// Number of live-or-dead keys currently stored.
    pub fn len(&self) -> usize {
        self.dict.len()
    }

    /// Whether the keyspace is empty.
    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    /// Number of keys carrying a deadline. The active sweep uses this
    /// to skip databases with nothing to expire in O(1).
    pub fn expires_len(&self) -> usize {
        self.expires.len()
    }

    /// Removes every key and deadline (FLUSHDB).
    pub fn clear(&mut self) {
        self.dict.clear();
        self.expires.clear();
    }

    /// Deletes `key` from both maps if its deadline has passed.
    /// Returns whether the key was removed.
    pub fn expire_if_needed(&mut self, key: &[u8], now: u64) -> bool {
        match self.expires.get(key) {
            Some(&deadline) if deadline <= now => {
                self.expires.remove(key);
                self.dict.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Randomly samples up to `count` entries of the expires map and
    /// deletes the ones past their deadline. Returns the number
    /// deleted. Persistent keys are never candidates, since they have no
    /// entry in the expires map.
    pub fn sample_expired(&mut self, count: usize, now: u64) -> usize {
        if self.expires.is_empty() {
            return 0;
        }

        let mut rng = rand::thread_rng();
        let sampled: Vec<Bytes> = self
            .expires
            .keys()
            .choose_multiple(&mut rng, count)
            .into_iter()
            .cloned()
            .collect();

        let mut removed = 0;
        for key in &sampled {
            if self.expire_if_needed(key, now) {
                removed += 1;
            }
        }
        removed
    }

    /// A point-in-time iterator over `(key, value, deadline)` triples,
    /// for the persistence worker. Expired-but-unreaped entries are
    /// filtered out so a snapshot never resurrects a dead key.
    pub fn snapshot(&self, now: u64) -> impl Iterator<Item = (&Bytes, &Value, Option<u64>)> + '_ {
        self.dict.iter().filter_map(move |(key, value)| {
            match self.expires.get(key).copied() {
                Some(deadline) if deadline <= now => None,
                deadline => Some((key, value, deadline)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_set_and_lookup() {
        let mut db = Db::new(0);
        db.set_key(key("name"), Value::str("flint"));
        assert_eq!(db.lookup(b"name", 0), Some(&Value::str("flint")));
        assert_eq!(db.lookup(b"missing", 0), None);
    }

    #[test]
    fn test_remove() {
        let mut db = Db::new(0);
        db.set_key(key("k"), Value::str("v"));
        assert!(db.remove(b"k", 0));
        assert!(!db.remove(b"k", 0));
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_lazy_expiration_on_lookup() {
        let mut db = Db::new(0);
        db.set_key(key("session"), Value::str("token"));
        db.set_expire(key("session"), 1_000);

        // Before the deadline the key is visible.
        assert!(db.lookup(b"session", 999).is_some());

        // At and after the deadline it is gone, and the side effect
        // removes it from both maps.
        assert!(db.lookup(b"session", 1_000).is_none());
        assert_eq!(db.len(), 0);
        assert_eq!(db.expires_len(), 0);
    }

    #[test]
    fn test_persistent_key_never_expires() {
        let mut db = Db::new(0);
        db.set_key(key("k"), Value::str("v"));
        assert!(db.lookup(b"k", u64::MAX).is_some());
        assert_eq!(db.sample_expired(20, u64::MAX), 0);
        assert!(db.contains(b"k", u64::MAX));
    }

    #[test]
    fn test_set_key_clears_deadline() {
        let mut db = Db::new(0);
        db.set_key(key("k"), Value::str("v1"));
        db.set_expire(key("k"), 500);

        db.set_key(key("k"), Value::str("v2"));
        assert_eq!(db.expire_deadline(b"k", 0), None);
        assert!(db.lookup(b"k", 10_000).is_some());
    }

    #[test]
    fn test_remove_expire_makes_persistent() {
        let mut db = Db::new(0);
        db.set_key(key("k"), Value::str("v"));
        db.set_expire(key("k"), 500);

        assert!(db.remove_expire(b"k"));
        assert!(!db.remove_expire(b"k"));
        assert!(db.lookup(b"k", 10_000).is_some());
    }

    #[test]
    fn test_sample_expired_removes_only_dead_keys() {
        let mut db = Db::new(0);
        for i in 0..50 {
            let k = key(&format!("dead:{}", i));
            db.set_key(k.clone(), Value::str("v"));
            db.set_expire(k, 100);
        }
        for i in 0..10 {
            let k = key(&format!("live:{}", i));
            db.set_key(k.clone(), Value::str("v"));
            db.set_expire(k, 1_000_000);
        }

        // Repeated sampling drains every dead key.
        let mut guard = 0;
        while db.expires_len() > 10 {
            db.sample_expired(20, 200);
            guard += 1;
            assert!(guard < 1_000, "sampling failed to converge");
        }

        assert_eq!(db.len(), 10);
        for i in 0..10 {
            assert!(db.contains(format!("live:{}", i).as_bytes(), 200));
        }
    }

    #[test]
    fn test_snapshot_filters_dead_entries() {
        let mut db = Db::new(0);
        db.set_key(key("live"), Value::str("v"));
        db.set_key(key("expiring"), Value::str("v"));
        db.set_expire(key("expiring"), 5_000);
        db.set_key(key("dead"), Value::str("v"));
        db.set_expire(key("dead"), 100);

        let mut entries: Vec<_> = db
            .snapshot(1_000)
            .map(|(k, _, deadline)| (k.clone(), deadline))
            .collect();
        entries.sort();

        assert_eq!(
            entries,
            vec![(key("expiring"), Some(5_000)), (key("live"), None)]
        );
    }

    #[test]
    fn test_clear() {
        let mut db = Db::new(3);
        db.set_key(key("k"), Value::str("v"));
        db.set_expire(key("k"), 99);
        db.clear();
        assert!(db.is_empty());
        assert_eq!(db.expires_len(), 0);
        assert_eq!(db.id(), 3);
    }
}
