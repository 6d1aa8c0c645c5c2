use lru::LruCache;

use crate::types::ResourceKey;

/// A decoded image together with its accounting weight.
#[derive(Clone, Debug)]
struct CacheEntry<T> {
    image: T,
    /// The decoded byte size of the image.
    cost: u64,
}

/// A strict LRU store of decoded images, bounded both by entry count and by total cost.
///
/// Recency is refreshed by [`get`](Self::get) only. Lookups that merely check for presence use
/// [`contains`](Self::contains) and leave the order untouched.
#[derive(Debug)]
pub struct MemoryStore<T> {
    entries: LruCache<ResourceKey, CacheEntry<T>>,
    max_count: usize,
    max_cost: u64,
    total_cost: u64,
}

impl<T: Clone> MemoryStore<T> {
    /// Creates an empty store. Both limits are clamped to at least `1`.
    pub fn new(max_count: usize, max_cost: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_count: max_count.max(1),
            max_cost: max_cost.max(1),
            total_cost: 0,
        }
    }

    /// Returns the image stored under `key` and marks it as most recently used.
    pub fn get(&mut self, key: &ResourceKey) -> Option<T> {
        self.entries.get(key).map(|entry| entry.image.clone())
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Inserts an image as the most recently used entry and returns the keys evicted to restore
    /// both bounds, least recently used first.
    ///
    /// An image that alone exceeds the cost bound is not stored at all, and an older image
    /// stored under the same key is dropped.
    pub fn insert(&mut self, key: ResourceKey, image: T, cost: u64) -> Vec<ResourceKey> {
        if cost > self.max_cost {
            if let Some(stale) = self.entries.pop(&key) {
                self.total_cost -= stale.cost;
            }
            tracing::debug!(
                key = %key,
                cost,
                max_cost = self.max_cost,
                "Image exceeds the cache budget, not storing it",
            );
            metric!(counter("images.oversized") += 1);
            return Vec::new();
        }

        if let Some(replaced) = self.entries.put(key, CacheEntry { image, cost }) {
            self.total_cost -= replaced.cost;
        }
        self.total_cost += cost;

        let mut evicted = Vec::new();
        // The new entry is the most recently used one and fits on its own, so it is never
        // reached by this loop.
        while self.entries.len() > self.max_count || self.total_cost > self.max_cost {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.total_cost -= entry.cost;
            evicted.push(key);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ResourceKey {
        format!("http://photos.local/images/{name}/file")
            .parse()
            .unwrap()
    }

    #[test]
    fn test_count_bound_evicts_least_recent() {
        let mut store = MemoryStore::new(2, 1024);
        assert!(store.insert(key("a"), "A", 1).is_empty());
        assert!(store.insert(key("b"), "B", 1).is_empty());

        let evicted = store.insert(key("c"), "C", 1);

        assert_eq!(evicted, vec![key("a")]);
        assert!(!store.contains(&key("a")));
        assert!(store.contains(&key("b")));
        assert!(store.contains(&key("c")));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut store = MemoryStore::new(2, 1024);
        store.insert(key("a"), "A", 1);
        store.insert(key("b"), "B", 1);
        assert_eq!(store.get(&key("a")), Some("A"));

        let evicted = store.insert(key("c"), "C", 1);

        assert_eq!(evicted, vec![key("b")]);
        assert!(store.contains(&key("a")));
    }

    #[test]
    fn test_contains_does_not_refresh_recency() {
        let mut store = MemoryStore::new(2, 1024);
        store.insert(key("a"), "A", 1);
        store.insert(key("b"), "B", 1);
        assert!(store.contains(&key("a")));

        assert_eq!(store.insert(key("c"), "C", 1), vec![key("a")]);
    }

    #[test]
    fn test_cost_bound_evicts_until_satisfied() {
        let mut store = MemoryStore::new(10, 100);
        store.insert(key("a"), "A", 40);
        store.insert(key("b"), "B", 40);
        store.insert(key("c"), "C", 10);

        let evicted = store.insert(key("d"), "D", 70);

        assert_eq!(evicted, vec![key("a"), key("b")]);
        assert_eq!(store.total_cost(), 80);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_oversized_entry_is_not_stored() {
        let mut store = MemoryStore::new(10, 100);
        store.insert(key("a"), "A", 60);

        let evicted = store.insert(key("huge"), "H", 101);

        assert!(evicted.is_empty());
        assert!(!store.contains(&key("huge")));
        assert!(store.contains(&key("a")));
        assert_eq!(store.total_cost(), 60);
    }

    #[test]
    fn test_oversized_replacement_drops_stale_entry() {
        let mut store = MemoryStore::new(10, 100);
        store.insert(key("a"), "A", 60);
        store.insert(key("b"), "B", 10);

        assert!(store.insert(key("a"), "A2", 101).is_empty());

        assert!(!store.contains(&key("a")));
        assert!(store.contains(&key("b")));
        assert_eq!(store.total_cost(), 10);
    }

    #[test]
    fn test_bounds_hold_after_many_insertions() {
        let mut store = MemoryStore::new(7, 500);
        for i in 0..200u64 {
            store.insert(key(&i.to_string()), i, (i * 37) % 120 + 1);
            assert!(store.len() <= 7);
            assert!(store.total_cost() <= 500);
        }
    }

    #[test]
    fn test_replacing_entry_updates_cost() {
        let mut store = MemoryStore::new(10, 100);
        store.insert(key("a"), "A", 60);
        store.insert(key("a"), "A2", 30);

        assert_eq!(store.len(), 1);
        assert_eq!(store.total_cost(), 30);
        assert_eq!(store.get(&key("a")), Some("A2"));
    }
}
