//! Cache Entry Module
//!
//! Defines a single cached record and its recency-list links.

// == Cache Entry ==
/// One cached key/value pair.
///
/// `prev` points towards the most recently used end of the list, `next`
/// towards the least recently used end. Links are arena slots, never owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The key bytes
    pub key: Vec<u8>,
    /// The stored value
    pub value: Vec<u8>,
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an unlinked entry.
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            prev: None,
            next: None,
        }
    }

    // == Size ==
    /// Bytes this entry charges against the cache capacity.
    pub fn size(&self) -> usize {
        charge(&self.key, &self.value)
    }
}

/// Bytes a key/value pair charges against the cache capacity.
pub fn charge(key: &[u8], value: &[u8]) -> usize {
    key.len() + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(b"key".to_vec(), b"value".to_vec());

        assert_eq!(entry.key, b"key");
        assert_eq!(entry.value, b"value");
        assert!(entry.prev.is_none());
        assert!(entry.next.is_none());
    }

    #[test]
    fn test_entry_size_counts_key_and_value() {
        let entry = CacheEntry::new(b"ab".to_vec(), b"cde".to_vec());
        assert_eq!(entry.size(), 5);
        assert_eq!(charge(b"", b""), 0);
    }
}
