//! Indexed take-once pools for pending engine values
//!
//! Backs the continuation table (pending-result handles), timeout callbacks,
//! and IRQ handlers. `push` assigns the numeric id that travels inside
//! messages as the correlation id; `take` redeems it exactly once. Taking an
//! unregistered id is a contract violation and panics.

use rustc_hash::FxHashMap;

/// Pool of values addressable by a numeric id
pub struct IndexedPool<T> {
    entries: FxHashMap<u32, T>,
    next_index: u32,
}

impl<T> IndexedPool<T> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            next_index: 0,
        }
    }

    /// Insert a value and return its id
    pub fn push(&mut self, value: T) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.insert(index, value);
        index
    }

    /// Remove and return the value stored at `index`
    ///
    /// Panics if the id was never registered or was already taken — redeeming
    /// an id twice is a programming-contract violation.
    pub fn take(&mut self, index: u32) -> T {
        self.entries
            .remove(&index)
            .unwrap_or_else(|| panic!("take of unregistered pool id {index}"))
    }

    /// Look up the value stored at `index` without removing it
    pub fn get(&self, index: u32) -> Option<&T> {
        self.entries.get(&index)
    }

    /// Whether an id is currently registered
    pub fn contains(&self, index: u32) -> bool {
        self.entries.contains_key(&index)
    }

    /// Number of registered values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool holds no values
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all values (teardown)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for IndexedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_sequential_ids() {
        let mut pool = IndexedPool::new();
        assert_eq!(pool.push("a"), 0);
        assert_eq!(pool.push("b"), 1);
        assert_eq!(pool.push("c"), 2);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_take_removes() {
        let mut pool = IndexedPool::new();
        let id = pool.push(42);

        assert_eq!(pool.take(id), 42);
        assert!(!pool.contains(id));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_get_does_not_remove() {
        let mut pool = IndexedPool::new();
        let id = pool.push(7);

        assert_eq!(pool.get(id), Some(&7));
        assert_eq!(pool.get(id), Some(&7));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    #[should_panic(expected = "take of unregistered pool id")]
    fn test_double_take_panics() {
        let mut pool = IndexedPool::new();
        let id = pool.push(1);
        pool.take(id);
        pool.take(id);
    }

    #[test]
    fn test_ids_not_reused_after_take() {
        let mut pool = IndexedPool::new();
        let a = pool.push("a");
        pool.take(a);
        let b = pool.push("b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_clear() {
        let mut pool = IndexedPool::new();
        pool.push(1);
        pool.push(2);
        pool.clear();
        assert!(pool.is_empty());
    }
}
