//! Bounded Store Module
//!
//! Capacity-limited LRU map whose slots also expire after a time-to-live.
//! Holds structure only; callers synchronize access.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

struct Stamped<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Stamped<T> {
    /// An entry is expired once the current time reaches its deadline.
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of [`BoundedStore::get`].
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Live entry; it is now the most recently used
    Hit(T),
    /// The entry had expired and has been removed
    Expired(T),
    /// Nothing stored under the key
    Absent,
}

// == Bounded Store ==
/// LRU map with per-slot expiry.
///
/// The underlying map starts empty and grows with use; the capacity is a
/// limit, not a reservation.
pub struct BoundedStore<K: Hash + Eq, T> {
    entries: LruCache<K, Stamped<T>>,
    capacity: NonZeroUsize,
}

impl<K: Hash + Eq, T: Clone> BoundedStore<K, T> {
    // == Constructor ==
    /// Creates a store that holds at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
        }
    }

    // == Get ==
    /// Looks up a key, promoting it on a hit.
    ///
    /// An expired entry is dropped on the spot and handed back so the caller
    /// can report it.
    pub fn get(&mut self, key: &K, now: Instant) -> Lookup<T> {
        let expired = match self.entries.get(key) {
            Some(slot) if !slot.is_expired(now) => return Lookup::Hit(slot.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            match self.entries.pop(key) {
                Some(slot) => Lookup::Expired(slot.value),
                None => Lookup::Absent,
            }
        } else {
            Lookup::Absent
        }
    }

    // == Insert ==
    /// Stores a value that expires `ttl` from `now`.
    ///
    /// Returns the least recently used entry if it had to make room. Replacing
    /// an existing key is not an eviction and returns `None`.
    pub fn insert(&mut self, key: K, value: T, ttl: Duration, now: Instant) -> Option<(K, T)> {
        let slot = Stamped {
            value,
            expires_at: now + ttl,
        };
        if self.entries.contains(&key) {
            self.entries.put(key, slot);
            return None;
        }
        let evicted = if self.entries.len() >= self.capacity.get() {
            self.entries
                .pop_lru()
                .map(|(evicted_key, evicted)| (evicted_key, evicted.value))
        } else {
            None
        };
        self.entries.put(key, slot);
        evicted
    }

    // == Remove ==
    /// Removes a live entry. Expired entries are dropped but count as absent.
    pub fn remove(&mut self, key: &K, now: Instant) -> Option<T> {
        let slot = self.entries.pop(key)?;
        if slot.is_expired(now) {
            None
        } else {
            Some(slot.value)
        }
    }

    /// Removes the entry only if `pred` accepts the stored value.
    pub fn remove_if<F>(&mut self, key: &K, pred: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        if pred(&self.entries.peek(key)?.value) {
            self.entries.pop(key).map(|slot| slot.value)
        } else {
            None
        }
    }

    // == Purge Expired ==
    /// Removes all expired entries and returns them.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<(K, T)>
    where
        K: Clone,
    {
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| self.entries.pop(&key).map(|slot| (key, slot.value)))
            .collect()
    }

    // == Length ==
    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn store(capacity: usize) -> BoundedStore<String, u32> {
        BoundedStore::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_store_new() {
        let store = store(10);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.capacity(), 10);
    }

    #[test]
    fn test_store_insert_and_get() {
        let mut store = store(10);
        let now = Instant::now();

        assert_eq!(store.insert(key("a"), 1, TTL, now), None);
        assert_eq!(store.get(&key("a"), now), Lookup::Hit(1));
        assert_eq!(store.get(&key("b"), now), Lookup::Absent);
    }

    #[test]
    fn test_store_expired_entry_is_removed_on_get() {
        let mut store = store(10);
        let now = Instant::now();
        store.insert(key("a"), 1, TTL, now);

        assert_eq!(store.get(&key("a"), now + TTL), Lookup::Expired(1));
        assert_eq!(store.len(), 0);
        assert_eq!(store.get(&key("a"), now + TTL), Lookup::Absent);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(2);
        let now = Instant::now();
        store.insert(key("a"), 1, TTL, now);
        store.insert(key("b"), 2, TTL, now);

        // touching a leaves b as the least recently used
        assert_eq!(store.get(&key("a"), now), Lookup::Hit(1));
        assert_eq!(store.insert(key("c"), 3, TTL, now), Some((key("b"), 2)));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&key("b"), now), Lookup::Absent);
    }

    #[test]
    fn test_store_grows_lazily_within_capacity() {
        let mut store = store(20_000);
        assert_eq!(store.capacity(), 20_000);
        assert_eq!(store.entries.cap().get(), usize::MAX);

        let now = Instant::now();
        store.insert(key("a"), 1, TTL, now);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_capacity_enforced_across_many_inserts() {
        let mut store = store(3);
        let now = Instant::now();
        let mut evicted = Vec::new();
        for i in 0..10u32 {
            if let Some((k, v)) = store.insert(format!("k{i}"), i, TTL, now) {
                evicted.push((k, v));
            }
            assert!(store.len() <= 3);
        }

        assert_eq!(store.len(), 3);
        let expected: Vec<(String, u32)> = (0..7u32).map(|i| (format!("k{i}"), i)).collect();
        assert_eq!(evicted, expected);
        assert_eq!(store.get(&key("k9"), now), Lookup::Hit(9));
    }

    #[test]
    fn test_store_replace_is_not_eviction() {
        let mut store = store(1);
        let now = Instant::now();
        store.insert(key("a"), 1, TTL, now);
        assert_eq!(store.insert(key("a"), 2, TTL, now), None);
        assert_eq!(store.get(&key("a"), now), Lookup::Hit(2));
    }

    #[test]
    fn test_store_remove() {
        let mut store = store(10);
        let now = Instant::now();
        store.insert(key("a"), 1, TTL, now);

        assert_eq!(store.remove(&key("a"), now), Some(1));
        assert_eq!(store.remove(&key("a"), now), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_remove_expired_counts_as_absent() {
        let mut store = store(10);
        let now = Instant::now();
        store.insert(key("a"), 1, TTL, now);

        assert_eq!(store.remove(&key("a"), now + TTL), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_remove_if() {
        let mut store = store(10);
        let now = Instant::now();
        store.insert(key("a"), 1, TTL, now);

        assert_eq!(store.remove_if(&key("a"), |v| *v == 2), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove_if(&key("a"), |v| *v == 1), Some(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_purge_expired() {
        let mut store = store(10);
        let now = Instant::now();
        store.insert(key("short"), 1, Duration::from_secs(1), now);
        store.insert(key("long"), 2, Duration::from_secs(10), now);

        let purged = store.purge_expired(now + Duration::from_secs(2));
        assert_eq!(purged, vec![(key("short"), 1)]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key("long"), now), Lookup::Hit(2));
    }
}
