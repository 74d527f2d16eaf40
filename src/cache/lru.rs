//! Recency List Module
//!
//! Doubly-linked list of cache entries ordered from most to least recently
//! used, stored in a slab arena and linked by slot index.

use slab::Slab;

use crate::cache::CacheEntry;

// == Recency List ==
/// Arena-backed recency list.
///
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// The list owns every entry; callers hold slot indices. All operations are O(1).
#[derive(Debug, Default)]
pub struct RecencyList {
    entries: Slab<CacheEntry>,
    head: Option<usize>,
    tail: Option<usize>,
    /// Sum of key and value sizes over all entries
    size: usize,
}

impl RecencyList {
    // == Constructor ==
    /// Creates a new empty list.
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            head: None,
            tail: None,
            size: 0,
        }
    }

    // == Push Front ==
    /// Inserts a new entry at the head and returns its slot.
    pub fn push_front(&mut self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let entry = CacheEntry::new(key, value);
        self.size += entry.size();
        let slot = self.entries.insert(entry);
        self.link_front(slot);
        slot
    }

    // == Move To Front ==
    /// Marks the entry at `slot` as most recently used.
    pub fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) || !self.entries.contains(slot) {
            return;
        }
        self.unlink(slot);
        self.link_front(slot);
    }

    // == Pop Back ==
    /// Removes and returns the least recently used entry.
    pub fn pop_back(&mut self) -> Option<(usize, CacheEntry)> {
        let slot = self.tail?;
        self.remove(slot).map(|entry| (slot, entry))
    }

    // == Remove ==
    /// Removes the entry at `slot`, wherever it sits in the list.
    pub fn remove(&mut self, slot: usize) -> Option<CacheEntry> {
        if !self.entries.contains(slot) {
            return None;
        }
        self.unlink(slot);
        let entry = self.entries.remove(slot);
        self.size -= entry.size();
        Some(entry)
    }

    // == Replace Value ==
    /// Swaps the value stored at `slot`, keeping the size total in step.
    ///
    /// Returns the previous value.
    pub fn replace_value(&mut self, slot: usize, value: Vec<u8>) -> Option<Vec<u8>> {
        let entry = self.entries.get_mut(slot)?;
        self.size = self.size - entry.value.len() + value.len();
        Some(std::mem::replace(&mut entry.value, value))
    }

    // == Accessors ==
    pub fn get(&self, slot: usize) -> Option<&CacheEntry> {
        self.entries.get(slot)
    }

    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    /// Total bytes charged by all entries.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.head = None;
        self.tail = None;
        self.size = 0;
    }

    // == Iteration ==
    /// Walks keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        std::iter::successors(self.head, move |&slot| self.entries[slot].next)
            .map(move |slot| self.entries[slot].key.as_slice())
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let entry = &mut self.entries[slot];
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(head) => self.entries[head].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let entry = &mut self.entries[slot];
            (entry.prev.take(), entry.next.take())
        };
        match prev {
            Some(prev) => self.entries[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.entries[next].prev = prev,
            None => self.tail = prev,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &RecencyList) -> Vec<Vec<u8>> {
        list.keys().map(|k| k.to_vec()).collect()
    }

    fn push(list: &mut RecencyList, key: &str) -> usize {
        list.push_front(key.as_bytes().to_vec(), b"v".to_vec())
    }

    #[test]
    fn test_list_new() {
        let list = RecencyList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.size(), 0);
        assert!(list.head.is_none());
        assert!(list.tail().is_none());
    }

    #[test]
    fn test_push_front_orders_newest_first() {
        let mut list = RecencyList::new();

        let a = push(&mut list, "a");
        push(&mut list, "b");
        let c = push(&mut list, "c");

        assert_eq!(list.len(), 3);
        assert_eq!(list.size(), 6);
        assert_eq!(list.head, Some(c));
        assert_eq!(list.tail(), Some(a));
        assert_eq!(keys(&list), vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_move_to_front() {
        let mut list = RecencyList::new();

        let a = push(&mut list, "a");
        let b = push(&mut list, "b");
        let c = push(&mut list, "c");

        // Tail moves to head
        list.move_to_front(a);
        assert_eq!(keys(&list), vec![b"a".to_vec(), b"c".to_vec(), b"b".to_vec()]);
        assert_eq!(list.tail(), Some(b));

        // Middle moves to head
        list.move_to_front(c);
        assert_eq!(keys(&list), vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(list.head, Some(c));
        assert_eq!(list.tail(), Some(b));
    }

    #[test]
    fn test_move_head_is_noop() {
        let mut list = RecencyList::new();

        push(&mut list, "a");
        let b = push(&mut list, "b");

        list.move_to_front(b);
        list.move_to_front(b);

        assert_eq!(keys(&list), vec![b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_pop_back() {
        let mut list = RecencyList::new();

        push(&mut list, "a");
        push(&mut list, "b");

        let (_, entry) = list.pop_back().unwrap();
        assert_eq!(entry.key, b"a");
        assert_eq!(list.len(), 1);
        assert_eq!(list.size(), 2);

        let (_, entry) = list.pop_back().unwrap();
        assert_eq!(entry.key, b"b");
        assert!(list.is_empty());
        assert!(list.head.is_none());
        assert!(list.tail().is_none());

        assert!(list.pop_back().is_none());
    }

    #[test]
    fn test_remove_middle_and_ends() {
        let mut list = RecencyList::new();

        let a = push(&mut list, "a");
        let b = push(&mut list, "b");
        let c = push(&mut list, "c");

        assert_eq!(list.remove(b).unwrap().key, b"b");
        assert_eq!(keys(&list), vec![b"c".to_vec(), b"a".to_vec()]);

        list.remove(c);
        assert_eq!(list.head, Some(a));
        assert_eq!(list.tail(), Some(a));

        list.remove(a);
        assert!(list.is_empty());
        assert_eq!(list.size(), 0);

        // Stale slot
        assert!(list.remove(a).is_none());
    }

    #[test]
    fn test_replace_value_tracks_size() {
        let mut list = RecencyList::new();

        let a = list.push_front(b"k".to_vec(), b"short".to_vec());
        assert_eq!(list.size(), 6);

        let old = list.replace_value(a, b"much longer".to_vec());
        assert_eq!(old, Some(b"short".to_vec()));
        assert_eq!(list.size(), 12);

        list.replace_value(a, Vec::new());
        assert_eq!(list.size(), 1);
    }

    #[test]
    fn test_slots_are_reused_after_removal() {
        let mut list = RecencyList::new();

        let a = push(&mut list, "a");
        list.remove(a);
        let b = push(&mut list, "b");

        assert_eq!(a, b);
        assert_eq!(list.get(b).unwrap().key, b"b");
    }

    #[test]
    fn test_clear() {
        let mut list = RecencyList::new();
        push(&mut list, "a");
        push(&mut list, "b");

        list.clear();

        assert!(list.is_empty());
        assert_eq!(list.size(), 0);
        assert_eq!(keys(&list), Vec::<Vec<u8>>::new());
    }
}
