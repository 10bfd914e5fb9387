//! Sharding Module
//!
//! Splits the keyspace across independent [`ExpirationLru`] instances so that
//! each structural lock only ever sees a fraction of the traffic.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};

use crate::cache::{ExpirationLru, Lookup};

// == Shard Selector ==
/// Deterministic key-to-shard mapping.
///
/// `DefaultHasher::new()` uses fixed keys, so a key maps to the same shard for
/// the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
}

impl ShardSelector {
    /// Creates a selector over `shards` partitions (at least one).
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
        }
    }

    /// Returns the shard index for `key`, in `[0, shards)`.
    pub fn shard_for_key<K: Hash + ?Sized>(&self, key: &K) -> usize {
        if self.shards == 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }

    /// Number of partitions keys are spread over.
    pub fn shard_count(&self) -> usize {
        self.shards
    }
}

// == Sharded LRU ==
/// A fixed array of independent caches selected by key hash.
pub struct ShardedLru<K: Hash + Eq, V, E> {
    selector: ShardSelector,
    shards: Vec<ExpirationLru<K, V, E>>,
}

impl<K: Hash + Eq, V, E> ShardedLru<K, V, E> {
    /// Wraps pre-built shards. Returns `None` for an empty list.
    pub fn from_shards(shards: Vec<ExpirationLru<K, V, E>>) -> Option<Self> {
        if shards.is_empty() {
            return None;
        }
        Some(Self {
            selector: ShardSelector::new(shards.len()),
            shards,
        })
    }

    fn shard(&self, key: &K) -> &ExpirationLru<K, V, E> {
        &self.shards[self.selector.shard_for_key(key)]
    }

    /// Stops every shard's cleanup task.
    pub fn stop(&self) {
        for shard in &self.shards {
            shard.stop();
        }
    }

    /// Total entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(ExpirationLru::len).sum()
    }

    /// Returns true if every shard is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(ExpirationLru::is_empty)
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl<K, V, E> ShardedLru<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// See [`ExpirationLru::get`].
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> Lookup<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.shard(&key).get(key, fetch).await
    }

    /// See [`ExpirationLru::del`].
    pub fn del(&self, key: &K) -> bool {
        self.shard(key).del(key)
    }
}
