//! Cache Store Module
//!
//! Byte-bounded cache engine combining a HashMap index with the recency list.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::entry::charge;
use crate::cache::{CacheStats, RecencyList};

// == Cache Store ==
/// Capacity-bounded LRU cache engine.
///
/// The index maps keys to recency-list slots and is updated in lockstep with
/// the list: a key is indexed if and only if its entry is linked. The store is
/// not synchronized; [`crate::cache::Storage`] wraps it in the shared lock.
#[derive(Debug)]
pub struct CacheStore {
    /// Key -> list slot
    index: HashMap<Vec<u8>, usize>,
    /// Entries in recency order, with the running byte total
    list: RecencyList,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum bytes (key + value) held at once
    capacity: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store holding at most `capacity` bytes of keys and values.
    pub fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::new(),
            list: RecencyList::new(),
            stats: CacheStats::new(capacity),
            capacity,
        }
    }

    // == Put ==
    /// Inserts a new entry or overwrites an existing one.
    ///
    /// Returns false without touching the cache when the pair alone is larger
    /// than the capacity. Otherwise least recently used entries are evicted
    /// until the new size fits.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        if charge(key, value) > self.capacity {
            return false;
        }

        match self.index.get(key).copied() {
            Some(slot) => self.overwrite(slot, value.to_vec()),
            None => self.insert(key, value),
        }
    }

    // == Put If Absent ==
    /// Inserts only when the key is missing.
    ///
    /// A present key is touched (moved to the head) and false is returned.
    pub fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.index.get(key).copied() {
            Some(slot) => {
                self.list.move_to_front(slot);
                false
            }
            None => self.put(key, value),
        }
    }

    // == Set ==
    /// Overwrites an existing key; returns false if the key is absent.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.index.get(key).copied() {
            Some(slot) if charge(key, value) <= self.capacity => {
                self.overwrite(slot, value.to_vec())
            }
            _ => false,
        }
    }

    // == Append / Prepend ==
    /// Appends `data` to an existing value; returns false if the key is absent
    /// or the grown value would exceed the capacity.
    pub fn append(&mut self, key: &[u8], data: &[u8]) -> bool {
        self.concat(key, data, false)
    }

    /// Prepends `data` to an existing value, see [`CacheStore::append`].
    pub fn prepend(&mut self, key: &[u8], data: &[u8]) -> bool {
        self.concat(key, data, true)
    }

    // == Delete ==
    /// Removes an entry; returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.index.remove(key) {
            Some(slot) => self.list.remove(slot).is_some(),
            None => false,
        }
    }

    // == Get ==
    /// Returns a copy of the value and moves the entry to the head.
    ///
    /// A miss performs no mutation besides the miss counter.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let Some(slot) = self.index.get(key).copied() else {
            self.stats.record_miss();
            return None;
        };

        self.list.move_to_front(slot);
        self.stats.record_hit();
        self.list.get(slot).map(|entry| entry.value.clone())
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&mut self) {
        self.index.clear();
        self.list.clear();
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.list.len();
        stats.bytes = self.list.size();
        stats
    }

    // == Accessors ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Bytes currently charged against the capacity.
    pub fn size(&self) -> usize {
        self.list.size()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Checks presence without touching recency.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.list.keys().map(<[u8]>::to_vec).collect()
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> bool {
        if !self.evict(charge(key, value), 0, None) {
            return false;
        }
        let slot = self.list.push_front(key.to_vec(), value.to_vec());
        self.index.insert(key.to_vec(), slot);
        true
    }

    fn overwrite(&mut self, slot: usize, value: Vec<u8>) -> bool {
        let old_len = match self.list.get(slot) {
            Some(entry) => entry.value.len(),
            None => return false,
        };

        self.list.move_to_front(slot);
        if !self.evict(value.len(), old_len, Some(slot)) {
            return false;
        }
        self.list.replace_value(slot, value);
        true
    }

    fn concat(&mut self, key: &[u8], data: &[u8], front: bool) -> bool {
        let Some(slot) = self.index.get(key).copied() else {
            return false;
        };
        let Some(entry) = self.list.get(slot) else {
            return false;
        };

        let mut value = Vec::with_capacity(entry.value.len() + data.len());
        if front {
            value.extend_from_slice(data);
            value.extend_from_slice(&entry.value);
        } else {
            value.extend_from_slice(&entry.value);
            value.extend_from_slice(data);
        }

        if charge(key, &value) > self.capacity {
            return false;
        }
        self.overwrite(slot, value)
    }

    // == Eviction ==
    /// Evicts from the tail until `size - outgoing + incoming` fits the capacity.
    ///
    /// `keep` is never evicted. Returns false if the list runs out first.
    fn evict(&mut self, incoming: usize, outgoing: usize, keep: Option<usize>) -> bool {
        while self.list.size() - outgoing + incoming > self.capacity {
            if self.list.tail().is_none() || self.list.tail() == keep {
                return false;
            }
            let Some((_, entry)) = self.list.pop_back() else {
                return false;
            };
            self.index.remove(&entry.key);
            self.stats.record_eviction();
            debug!(
                key = %String::from_utf8_lossy(&entry.key),
                bytes = entry.size(),
                "evicted least recently used entry"
            );
        }
        true
    }

    /// Checks that index, list and byte total agree.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.index.len(), self.list.len(), "index/list length");
        let mut total = 0;
        for (key, &slot) in &self.index {
            let entry = self.list.get(slot).expect("indexed slot must be linked");
            assert_eq!(&entry.key, key, "index points at wrong entry");
            total += entry.size();
        }
        assert_eq!(total, self.list.size(), "byte total");
        assert_eq!(self.list.keys().count(), self.list.len(), "list walk");
        assert!(self.list.size() <= self.capacity, "capacity exceeded");
    }
}
