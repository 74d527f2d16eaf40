//! Shared Storage Handle
//!
//! Process-wide handle to the cache engine. Every operation runs inside one
//! exclusive region so the index and the recency list change together.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::{CacheStats, CacheStore};

// == Storage ==
/// Cloneable, thread-safe handle to a single [`CacheStore`].
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<Mutex<CacheStore>>,
}

impl Storage {
    /// Creates a cache bounded to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::from_store(CacheStore::new(capacity))
    }

    pub fn from_store(store: CacheStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Insert or overwrite. See [`CacheStore::put`].
    pub fn put(&self, key: &[u8], value: &[u8]) -> bool {
        self.lock().put(key, value)
    }

    /// Insert only when absent. See [`CacheStore::put_if_absent`].
    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> bool {
        self.lock().put_if_absent(key, value)
    }

    /// Overwrite only when present. See [`CacheStore::set`].
    pub fn set(&self, key: &[u8], value: &[u8]) -> bool {
        self.lock().set(key, value)
    }

    pub fn append(&self, key: &[u8], data: &[u8]) -> bool {
        self.lock().append(key, data)
    }

    pub fn prepend(&self, key: &[u8], data: &[u8]) -> bool {
        self.lock().prepend(key, data)
    }

    pub fn delete(&self, key: &[u8]) -> bool {
        self.lock().delete(key)
    }

    /// Lookup with recency touch. See [`CacheStore::get`].
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.lock().get(key)
    }

    pub fn clear(&self) {
        self.lock().clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn size(&self) -> usize {
        self.lock().size()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    // A panic inside the store cannot leave it half-updated: every public
    // operation finishes its list/index edits before returning, so a poisoned
    // guard is still usable.
    fn lock(&self) -> MutexGuard<'_, CacheStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_storage_clones_share_state() {
        let storage = Storage::new(100);
        let other = storage.clone();

        assert!(storage.put(b"k", b"v"));
        assert_eq!(other.get(b"k"), Some(b"v".to_vec()));
        assert!(other.delete(b"k"));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_storage_concurrent_access_respects_capacity() {
        let storage = Storage::new(1000);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let storage = storage.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("t{}-k{}", t, i % 40);
                        storage.put(key.as_bytes(), b"0123456789");
                        storage.get(format!("t{}-k{}", (t + 1) % 8, i % 40).as_bytes());
                        if i % 7 == 0 {
                            storage.delete(key.as_bytes());
                        }
                        assert!(storage.size() <= storage.capacity());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(storage.size() <= 1000);
        storage.lock().assert_consistent();
    }

    #[test]
    fn test_storage_concurrent_gets_keep_entry_at_head() {
        let storage = Storage::new(100);
        storage.put(b"a", b"1");
        storage.put(b"hot", b"2");
        storage.put(b"b", b"3");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let storage = storage.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(storage.get(b"hot"), Some(b"2".to_vec()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let keys = storage.lock().keys();
        assert_eq!(keys, vec![b"hot".to_vec(), b"b".to_vec(), b"a".to_vec()]);
        assert_eq!(storage.stats().hits, 400);
    }
}
