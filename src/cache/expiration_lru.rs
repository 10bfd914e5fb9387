//! Expiration LRU Module
//!
//! Bounded LRU cache with per-entry expiry and built-in stampede protection.
//!
//! The first caller to miss a key publishes an empty placeholder that is
//! already write-locked, then runs the fetch. Everyone else who finds the
//! placeholder waits on its read lock instead of fetching again. The
//! store-wide lock only covers structural changes and is never held while a
//! fetch runs.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::entry::FillGuard;
use crate::cache::store::{BoundedStore, Lookup as StoreLookup};
use crate::cache::{CacheEntry, Hook, NoopHook};
use crate::config::EvictionMode;
use crate::error::{self, CacheError};
use crate::tasks::{spawn_cleanup_task, Purge};

/// Invoked with the key and value of an entry evicted by capacity or expiry.
pub type EvictCallback<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

// == Lookup ==
/// Result of [`ExpirationLru::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<V, E> {
    /// The fetched value or error
    pub result: Result<V, E>,
    /// True when this call ran the fetch
    pub was_miss: bool,
}

impl<V, E> Lookup<V, E> {
    /// Drops the miss flag.
    pub fn into_result(self) -> Result<V, E> {
        self.result
    }
}

struct Inner<K: Hash + Eq, V, E> {
    store: Mutex<BoundedStore<K, CacheEntry<V, E>>>,
    success_ttl: Duration,
    failure_ttl: Duration,
    hook: Arc<dyn Hook>,
    on_evict: Option<EvictCallback<K, V>>,
}

impl<K, V, E> Inner<K, V, E>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Reports evicted entries. Must be called without the store lock held.
    fn notify_evicted<I>(&self, evicted: I)
    where
        I: IntoIterator<Item = (K, CacheEntry<V, E>)>,
    {
        let Some(on_evict) = &self.on_evict else {
            return;
        };
        for (key, entry) in evicted {
            // in-flight and failed placeholders have nothing to report
            if let Some(value) = entry.peek_value() {
                on_evict(&key, &value);
            }
        }
    }
}

impl<K, V, E> Purge for Inner<K, V, E>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send + Sync,
    E: Send + Sync,
{
    fn purge_expired(&self) -> usize {
        let purged = self.store.lock().purge_expired(Instant::now());
        let count = purged.len();
        self.notify_evicted(purged);
        count
    }
}

// == Builder ==
/// Validated construction of an [`ExpirationLru`].
pub struct ExpirationLruBuilder<K, V> {
    capacity: NonZeroUsize,
    success_ttl: Duration,
    failure_ttl: Duration,
    eviction: EvictionMode,
    cleanup_interval: Duration,
    hook: Arc<dyn Hook>,
    on_evict: Option<EvictCallback<K, V>>,
}

impl<K, V> ExpirationLruBuilder<K, V> {
    /// Lazy expiry, no-op hook, no eviction callback, one minute success TTL,
    /// five second failure TTL.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            success_ttl: Duration::from_secs(60),
            failure_ttl: Duration::from_secs(5),
            eviction: EvictionMode::Lazy,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            hook: Arc::new(NoopHook),
            on_evict: None,
        }
    }

    /// Lifetime of a successfully fetched entry.
    pub fn success_ttl(mut self, ttl: Duration) -> Self {
        self.success_ttl = ttl;
        self
    }

    /// Lifetime configured for failed fetches, which are never retained.
    pub fn failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    /// Selects active or lazy expiry; active sweeps every `cleanup_interval`.
    pub fn eviction(mut self, mode: EvictionMode) -> Self {
        self.eviction = mode;
        self
    }

    /// Sweep period of the active eviction task.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Replaces the default no-op hook.
    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hook = hook;
        self
    }

    /// Callback for entries evicted by capacity or expiry.
    pub fn on_evict<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.on_evict = Some(Arc::new(f));
        self
    }

    // == Build ==
    /// Validates the settings and, in active mode, starts the cleanup task.
    ///
    /// Active mode fails with [`CacheError::RuntimeUnavailable`] outside a
    /// Tokio runtime.
    pub fn build<E>(self) -> error::Result<ExpirationLru<K, V, E>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        if self.success_ttl.is_zero() || self.failure_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "ttl must be greater than zero".to_string(),
            ));
        }

        let inner = Arc::new(Inner {
            store: Mutex::new(BoundedStore::new(self.capacity)),
            success_ttl: self.success_ttl,
            failure_ttl: self.failure_ttl,
            hook: self.hook,
            on_evict: self.on_evict,
        });

        let cleanup = match self.eviction {
            EvictionMode::Lazy => None,
            EvictionMode::Active => {
                if self.cleanup_interval.is_zero() {
                    return Err(CacheError::InvalidConfig(
                        "cleanup_interval must be greater than zero".to_string(),
                    ));
                }
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|_| CacheError::RuntimeUnavailable)?;
                let target: Weak<Inner<K, V, E>> = Arc::downgrade(&inner);
                Some(spawn_cleanup_task(&runtime, target, self.cleanup_interval))
            }
        };

        Ok(ExpirationLru {
            inner,
            cleanup: Mutex::new(cleanup),
        })
    }
}

// == Expiration LRU ==
/// Stampede-protected LRU cache whose entries expire after a time-to-live.
///
/// # Example
/// ```
/// use std::num::NonZeroUsize;
/// use std::time::Duration;
/// use localcache::cache::ExpirationLru;
///
/// # tokio_test::block_on(async {
/// let cache: ExpirationLru<String, u64, String> = ExpirationLru::new(
///     NonZeroUsize::new(128).unwrap(),
///     Duration::from_secs(60),
///     Duration::from_secs(5),
/// )
/// .unwrap();
///
/// let first = cache.get("user:1".to_string(), || async { Ok(42) }).await;
/// assert!(first.was_miss);
///
/// let second = cache.get("user:1".to_string(), || async { Ok(0) }).await;
/// assert_eq!(second.result, Ok(42));
/// assert!(!second.was_miss);
/// # });
/// ```
pub struct ExpirationLru<K: Hash + Eq, V, E> {
    inner: Arc<Inner<K, V, E>>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl<K: Hash + Eq, V, E> ExpirationLru<K, V, E> {
    /// Starts a builder; see [`ExpirationLruBuilder::new`] for the defaults.
    pub fn builder(capacity: NonZeroUsize) -> ExpirationLruBuilder<K, V> {
        ExpirationLruBuilder::new(capacity)
    }
}

impl<K, V, E> ExpirationLru<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a lazily expiring cache with a no-op hook and no eviction callback.
    pub fn new(
        capacity: NonZeroUsize,
        success_ttl: Duration,
        failure_ttl: Duration,
    ) -> error::Result<Self> {
        Self::builder(capacity)
            .success_ttl(success_ttl)
            .failure_ttl(failure_ttl)
            .build()
    }

    // == Get ==
    /// Returns the cached result for `key`, running `fetch` on a miss.
    ///
    /// Concurrent callers for a missing key share a single fetch: the first
    /// runs it with `was_miss = true` and the rest wait for its result. A
    /// failed fetch is handed to everyone already waiting but is not kept,
    /// so the next caller fetches again.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> Lookup<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        loop {
            let mut evicted = Vec::new();
            let step = {
                let mut store = self.inner.store.lock();
                let now = Instant::now();
                match store.get(&key, now) {
                    StoreLookup::Hit(entry) => Step::Wait(entry),
                    lookup => {
                        if let StoreLookup::Expired(stale) = lookup {
                            evicted.push((key.clone(), stale));
                        }
                        let entry = CacheEntry::new();
                        let slot = entry
                            .try_lock_for_fill()
                            .expect("unpublished entry lock is uncontended");
                        let ttl = self.inner.success_ttl;
                        if let Some(lru) = store.insert(key.clone(), entry.clone(), ttl, now) {
                            evicted.push(lru);
                        }
                        Step::Fill(entry, slot)
                    }
                }
            };

            if !evicted.is_empty() {
                debug!("Evicted {} entries while looking up a key", evicted.len());
                self.inner.notify_evicted(evicted);
            }

            match step {
                Step::Wait(entry) => {
                    if let Some(result) = entry.read().await {
                        self.inner.hook.increment_hit();
                        return Lookup {
                            result,
                            was_miss: false,
                        };
                    }
                    // the filler was dropped mid-fetch; look again
                }
                Step::Fill(entry, slot) => {
                    self.inner.hook.increment_miss();
                    let filling = Filling {
                        inner: &self.inner,
                        key,
                        entry,
                        slot,
                        done: false,
                    };
                    let result = fetch().await;
                    filling.finish(result.clone());
                    return Lookup {
                        result,
                        was_miss: true,
                    };
                }
            }
        }
    }

    // == Delete ==
    /// Removes `key`. Returns whether a live entry was removed.
    pub fn del(&self, key: &K) -> bool {
        let removed = self.inner.store.lock().remove(key, Instant::now()).is_some();
        if removed {
            self.inner.hook.increment_del_hit();
        } else {
            self.inner.hook.increment_del_miss();
        }
        removed
    }

    // == Purge ==
    /// Drops every expired entry now, firing the eviction callback for each.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }
}

impl<K: Hash + Eq, V, E> ExpirationLru<K, V, E> {
    // == Stop ==
    /// Stops the active eviction task, if any. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(handle) = self.cleanup.lock().take() {
            handle.abort();
        }
    }

    /// Returns the number of stored entries, including in-flight placeholders.
    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.store.lock().is_empty()
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.inner.store.lock().capacity()
    }

    /// Lifetime of successful entries.
    pub fn success_ttl(&self) -> Duration {
        self.inner.success_ttl
    }

    /// Configured failure lifetime. Failed fetches are never retained.
    pub fn failure_ttl(&self) -> Duration {
        self.inner.failure_ttl
    }
}

impl<K: Hash + Eq, V, E> Drop for ExpirationLru<K, V, E> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<K: Hash + Eq, V, E> fmt::Debug for ExpirationLru<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationLru")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("success_ttl", &self.inner.success_ttl)
            .finish_non_exhaustive()
    }
}

enum Step<V, E> {
    Wait(CacheEntry<V, E>),
    Fill(CacheEntry<V, E>, FillGuard<V, E>),
}

/// A published placeholder and its write lock.
///
/// `Drop::drop` runs before the fields drop, so an unfinished placeholder
/// leaves the store before the lock releases its waiters.
struct Filling<'a, K: Hash + Eq, V, E> {
    inner: &'a Inner<K, V, E>,
    key: K,
    entry: CacheEntry<V, E>,
    slot: FillGuard<V, E>,
    done: bool,
}

impl<K: Hash + Eq, V, E> Filling<'_, K, V, E> {
    fn finish(mut self, result: Result<V, E>) {
        let failed = result.is_err();
        *self.slot = Some(result);
        if failed {
            self.remove_placeholder();
            debug!("Fetch failed; entry not retained");
        }
        self.done = true;
    }

    fn remove_placeholder(&self) {
        self.inner
            .store
            .lock()
            .remove_if(&self.key, |stored| stored.same_entry(&self.entry));
    }
}

impl<K: Hash + Eq, V, E> Drop for Filling<'_, K, V, E> {
    fn drop(&mut self) {
        if !self.done {
            warn!("Fetch abandoned before completion; dropping placeholder");
            self.remove_placeholder();
        }
    }
}
