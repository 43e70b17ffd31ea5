//! Recency-ordered key table
//!
//! The key index and the recency list live in one type, so a key is in the
//! index exactly when its node is linked into the list. Nodes sit in an arena
//! addressed by slot indices, giving O(1) unlink/relink without raw pointers.

use std::collections::HashMap;
use std::hash::Hash;
use ahash::RandomState;

/// Upper bound on slots reserved up front; larger tables grow on demand.
const PREALLOC_LIMIT: usize = 4096;

/// Node in the recency list
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Key index plus recency list. Head is the MRU entry, tail the LRU entry.
///
/// The table never evicts on its own; capacity is the engine's concern.
pub(crate) struct LruTable<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
}

impl<K, V> LruTable<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty table sized for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        let reserve = capacity.min(PREALLOC_LIMIT);
        Self {
            map: HashMap::with_capacity_and_hasher(reserve, RandomState::new()),
            nodes: Vec::with_capacity(reserve),
            head: None,
            tail: None,
            free_list: Vec::new(),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up a value and promote its entry to the head
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Look up a value without touching the recency order
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Insert or update a key, leaving it at the head.
    ///
    /// Returns the replaced value when the key was already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.map.get(&key) {
            let old = self.nodes[idx]
                .as_mut()
                .map(|node| std::mem::replace(&mut node.value, value));
            self.move_to_front(idx);
            return old;
        }

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_front(idx);
        self.map.insert(key, idx);
        None
    }

    /// Remove a key from both the index and the list
    pub fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let idx = self.map.remove(key)?;
        self.release(idx)
    }

    /// Remove the least recently used entry
    pub fn pop_back(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        let (key, value) = self.release(idx)?;
        self.map.remove(&key);
        Some((key, value))
    }

    /// Remove the most recently used entry
    pub fn pop_front(&mut self) -> Option<(K, V)> {
        let idx = self.head?;
        let (key, value) = self.release(idx)?;
        self.map.remove(&key);
        Some((key, value))
    }

    /// MRU entry
    pub fn front(&self) -> Option<(&K, &V)> {
        self.head
            .and_then(|idx| self.nodes[idx].as_ref())
            .map(|node| (&node.key, &node.value))
    }

    /// LRU entry
    pub fn back(&self) -> Option<(&K, &V)> {
        self.tail
            .and_then(|idx| self.nodes[idx].as_ref())
            .map(|node| (&node.key, &node.value))
    }

    /// Iterate entries from MRU to LRU; `.rev()` walks LRU to MRU
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            front: self.head,
            back: self.tail,
            remaining: self.map.len(),
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &mut self.nodes[idx] {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    /// Unlink a slot and hand its key/value back. The caller keeps the index in step.
    fn release(&mut self, idx: usize) -> Option<(K, V)> {
        self.unlink(idx);
        let node = self.nodes[idx].take();
        debug_assert!(node.is_some(), "released an empty slot");
        self.free_list.push(idx);
        node.map(|node| (node.key, node.value))
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    /// Verify index/list agreement, link symmetry and acyclicity
    #[cfg(test)]
    pub fn check_invariants(&self) {
        let len = self.map.len();

        if len == 0 {
            assert!(self.head.is_none() && self.tail.is_none());
            return;
        }

        let head = self.head.expect("non-empty table without head");
        let tail = self.tail.expect("non-empty table without tail");
        assert!(self.nodes[head].as_ref().unwrap().prev.is_none());
        assert!(self.nodes[tail].as_ref().unwrap().next.is_none());

        let mut forward = Vec::with_capacity(len);
        let mut cursor = Some(head);
        let mut prev = None;
        while let Some(idx) = cursor {
            assert!(forward.len() < len, "cycle in recency list");
            let node = self.nodes[idx].as_ref().expect("linked slot is empty");
            assert_eq!(node.prev, prev);
            assert_eq!(self.map.get(&node.key), Some(&idx));
            forward.push(idx);
            prev = Some(idx);
            cursor = node.next;
        }
        assert_eq!(forward.len(), len);
        assert_eq!(prev, Some(tail));

        let mut backward = Vec::with_capacity(len);
        let mut cursor = Some(tail);
        while let Some(idx) = cursor {
            assert!(backward.len() < len, "cycle in recency list");
            backward.push(idx);
            cursor = self.nodes[idx].as_ref().unwrap().prev;
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }
}

/// Borrowing iterator over a table, MRU first
pub(crate) struct Iter<'a, K, V> {
    nodes: &'a [Option<Node<K, V>>],
    front: Option<usize>,
    back: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let nodes = self.nodes;
        let node = nodes[self.front?].as_ref()?;
        self.front = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let nodes = self.nodes;
        let node = nodes[self.back?].as_ref()?;
        self.back = node.prev;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(table: &LruTable<i32, &'static str>) -> Vec<i32> {
        table.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_lru_basic() {
        let mut table = LruTable::with_capacity(2);

        table.insert(1, "a");
        table.insert(2, "b");

        assert_eq!(table.get(&1), Some(&"a"));
        assert_eq!(table.get(&2), Some(&"b"));
        assert_eq!(table.len(), 2);
        table.check_invariants();
    }

    #[test]
    fn test_lru_pop_back_is_oldest() {
        let mut table = LruTable::with_capacity(3);

        table.insert(1, "a");
        table.insert(2, "b");
        table.insert(3, "c");

        assert_eq!(table.pop_back(), Some((1, "a")));
        assert_eq!(keys(&table), vec![3, 2]);
        assert!(!table.contains(&1));
        table.check_invariants();
    }

    #[test]
    fn test_lru_get_promotes() {
        let mut table = LruTable::with_capacity(3);

        table.insert(1, "a");
        table.insert(2, "b");
        table.insert(3, "c");
        table.get(&1);

        assert_eq!(keys(&table), vec![1, 3, 2]);
        assert_eq!(table.pop_back(), Some((2, "b")));
        table.check_invariants();
    }

    #[test]
    fn test_lru_peek_keeps_order() {
        let mut table = LruTable::with_capacity(3);

        table.insert(1, "a");
        table.insert(2, "b");

        assert_eq!(table.peek(&1), Some(&"a"));
        assert_eq!(keys(&table), vec![2, 1]);
    }

    #[test]
    fn test_lru_remove() {
        let mut table = LruTable::with_capacity(3);

        table.insert(1, "a");
        table.insert(2, "b");
        table.insert(3, "c");

        assert_eq!(table.remove(&2), Some((2, "b")));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&2), None);
        assert_eq!(table.remove(&2), None);
        assert_eq!(keys(&table), vec![3, 1]);
        table.check_invariants();
    }

    #[test]
    fn test_lru_remove_head_and_tail() {
        let mut table = LruTable::with_capacity(3);

        table.insert(1, "a");
        table.insert(2, "b");
        table.insert(3, "c");

        assert_eq!(table.pop_front(), Some((3, "c")));
        assert_eq!(table.remove(&1), Some((1, "a")));
        assert_eq!(table.front(), Some((&2, &"b")));
        assert_eq!(table.back(), Some((&2, &"b")));
        table.check_invariants();

        assert_eq!(table.pop_back(), Some((2, "b")));
        assert!(table.is_empty());
        assert_eq!(table.pop_back(), None);
        assert_eq!(table.pop_front(), None);
        table.check_invariants();
    }

    #[test]
    fn test_lru_overwrite() {
        let mut table = LruTable::with_capacity(2);

        assert_eq!(table.insert(1, "a"), None);
        table.insert(2, "x");
        assert_eq!(table.insert(1, "b"), Some("a"));

        assert_eq!(table.peek(&1), Some(&"b"));
        assert_eq!(table.len(), 2);
        assert_eq!(keys(&table), vec![1, 2]);
        table.check_invariants();
    }

    #[test]
    fn test_lru_slots_are_reused() {
        let mut table = LruTable::with_capacity(2);

        for i in 0..100 {
            table.insert(i, "v");
            if table.len() > 2 {
                table.pop_back();
            }
        }

        assert!(table.nodes.len() <= 3);
        assert_eq!(keys(&table), vec![99, 98]);
        table.check_invariants();
    }

    #[test]
    fn test_lru_iter_both_ends() {
        let mut table = LruTable::with_capacity(4);

        for i in 1..=4 {
            table.insert(i, "v");
        }

        let lru_first: Vec<i32> = table.iter().rev().map(|(k, _)| *k).collect();
        assert_eq!(lru_first, vec![1, 2, 3, 4]);

        let mut iter = table.iter();
        assert_eq!(iter.len(), 4);
        assert_eq!(iter.next().map(|(k, _)| *k), Some(4));
        assert_eq!(iter.next_back().map(|(k, _)| *k), Some(1));
        assert_eq!(iter.next().map(|(k, _)| *k), Some(3));
        assert_eq!(iter.next_back().map(|(k, _)| *k), Some(2));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }
}
