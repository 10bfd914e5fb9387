//! Local Cache Module
//!
//! String-keyed read-through cache assembled from a [`Config`]: sharded
//! expiring LRUs, a link index for cascading invalidation, and the
//! configured pre-delete callbacks.

use std::future::Future;
use std::num::NonZeroUsize;

use tracing::debug;

use crate::cache::{ExpirationLruBuilder, Lookup, ShardedLru};
use crate::config::{Config, PreDeleteFn};
use crate::error::{CacheError, Result};
use crate::link::LinkIndex;

// == Local Cache ==
/// Read-through cache for a single value type.
///
/// # Example
/// ```
/// use localcache::{Config, LocalCache};
///
/// # tokio_test::block_on(async {
/// let config = Config::builder().with_local_slot_num(4).build().unwrap();
/// let cache: LocalCache<String, String> = LocalCache::new(&config).unwrap();
///
/// let name = cache
///     .get("user:1:name", || async { Ok("alice".to_string()) })
///     .await;
/// assert_eq!(name.result, Ok("alice".to_string()));
///
/// cache.del(&["user:1:name".to_string()]);
/// # });
/// ```
pub struct LocalCache<V, E> {
    local: Option<ShardedLru<String, V, E>>,
    link: LinkIndex,
    pre_delete: Vec<PreDeleteFn>,
}

impl<V, E> LocalCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Builds the cache layers described by `config`.
    ///
    /// Active eviction needs a running Tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        let local = if config.local_enabled() {
            let capacity = NonZeroUsize::new(config.local_slot_size).ok_or_else(|| {
                CacheError::InvalidConfig("local_slot_size must be greater than zero".to_string())
            })?;
            let shards = (0..config.local_slot_num)
                .map(|_| {
                    ExpirationLruBuilder::new(capacity)
                        .success_ttl(config.success_ttl)
                        .failure_ttl(config.failure_ttl)
                        .eviction(config.eviction)
                        .cleanup_interval(config.cleanup_interval)
                        .hook(config.hook.clone())
                        .build()
                })
                .collect::<Result<Vec<_>>>()?;
            ShardedLru::from_shards(shards)
        } else {
            None
        };

        debug!(
            "Local cache ready: shards={}, linking={}",
            local.as_ref().map_or(0, ShardedLru::shard_count),
            config.link_enabled()
        );

        Ok(Self {
            local,
            link: LinkIndex::new(config.link_slot_num),
            pre_delete: config.pre_delete.clone(),
        })
    }

    // == Get ==
    /// Returns the cached value for `key`, running `fetch` on a miss.
    ///
    /// With local caching disabled every call runs `fetch` and reports a miss
    /// without touching the hook.
    pub async fn get<F, Fut>(&self, key: &str, fetch: F) -> Lookup<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        match &self.local {
            Some(local) => local.get(key.to_string(), fetch).await,
            None => Lookup {
                result: fetch().await,
                was_miss: true,
            },
        }
    }

    // == Get Link ==
    /// Like [`get`](Self::get), and on success links `key` to each of `links`
    /// so that deleting any of them also drops `key`.
    pub async fn get_link<F, Fut>(&self, key: &str, fetch: F, links: &[String]) -> Lookup<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let lookup = self.get(key, fetch).await;
        if lookup.result.is_ok() && !links.is_empty() {
            self.link.link(key, links);
        }
        lookup
    }

    // == Delete ==
    /// Runs the pre-delete callbacks with `keys`, then deletes them locally.
    pub fn del(&self, keys: &[String]) {
        for f in &self.pre_delete {
            f(keys);
        }
        self.del_local(keys);
    }

    /// Deletes `keys` and everything linked to them from this process only.
    pub fn del_local(&self, keys: &[String]) {
        let Some(local) = &self.local else {
            return;
        };
        for key in keys {
            for linked in self.link.take(key) {
                local.del(&linked);
            }
            local.del(key);
        }
    }

    /// Stops background eviction on every shard.
    pub fn stop(&self) {
        if let Some(local) = &self.local {
            local.stop();
        }
    }

    /// Total number of locally cached entries.
    pub fn len(&self) -> usize {
        self.local.as_ref().map_or(0, ShardedLru::len)
    }

    /// Returns true if nothing is cached locally.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CountingHook;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> crate::config::ConfigBuilder {
        Config::builder()
            .with_local_slot_num(4)
            .with_local_slot_size(64)
            .with_link_slot_num(4)
    }

    #[tokio::test]
    async fn test_get_caches_value() {
        let cache: LocalCache<u32, String> = LocalCache::new(&config().build().unwrap()).unwrap();

        let first = cache.get("k", || async { Ok(1) }).await;
        let second = cache.get("k", || async { Ok(2) }).await;
        assert_eq!((first.result, first.was_miss), (Ok(1), true));
        assert_eq!((second.result, second.was_miss), (Ok(1), false));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_local_always_fetches() {
        let hook = Arc::new(CountingHook::new());
        let config = config()
            .with_local_disabled()
            .with_hook(hook.clone())
            .build()
            .unwrap();
        let cache: LocalCache<u32, String> = LocalCache::new(&config).unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let lookup = cache
                .get("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await;
            assert!(lookup.was_miss);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty());
        assert_eq!(hook.snapshot().misses, 0);
        cache.del(&["k".to_string()]);
    }

    #[tokio::test]
    async fn test_del_runs_pre_delete_in_order_before_local_delete() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = log.clone();
        let second = log.clone();
        let config = config()
            .with_pre_delete(move |keys| first.lock().push(format!("first:{}", keys.join(","))))
            .with_pre_delete(move |keys| second.lock().push(format!("second:{}", keys.join(","))))
            .build()
            .unwrap();
        let cache: LocalCache<u32, String> = LocalCache::new(&config).unwrap();

        cache.get("a", || async { Ok(1) }).await;
        cache.get("b", || async { Ok(2) }).await;
        cache.del(&["a".to_string(), "b".to_string()]);

        assert_eq!(*log.lock(), vec!["first:a,b", "second:a,b"]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_del_local_skips_pre_delete() {
        let called = Arc::new(AtomicUsize::new(0));
        let counter = called.clone();
        let config = config()
            .with_pre_delete(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let cache: LocalCache<u32, String> = LocalCache::new(&config).unwrap();

        cache.get("a", || async { Ok(1) }).await;
        cache.del_local(&["a".to_string()]);
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_linked_keys_are_deleted_together() {
        let hook = Arc::new(CountingHook::new());
        let config = config().with_hook(hook.clone()).build().unwrap();
        let cache: LocalCache<u32, String> = LocalCache::new(&config).unwrap();

        cache.get("member:a", || async { Ok(1) }).await;
        cache
            .get_link("group:1:members", || async { Ok(2) }, &["member:a".to_string()])
            .await;
        cache.get("unrelated", || async { Ok(3) }).await;

        cache.del(&["member:a".to_string()]);

        assert_eq!(cache.len(), 1);
        let refetched = cache.get("group:1:members", || async { Ok(20) }).await;
        assert!(refetched.was_miss);
        assert_eq!(hook.snapshot().del_hits, 2);
    }

    #[tokio::test]
    async fn test_link_disabled_deletes_only_named_keys() {
        let config = config().with_link_disabled().build().unwrap();
        assert!(!config.link_enabled());
        let cache: LocalCache<u32, String> = LocalCache::new(&config).unwrap();

        cache.get("member:a", || async { Ok(1) }).await;
        cache
            .get_link("group:1:members", || async { Ok(2) }, &["member:a".to_string()])
            .await;
        cache.del(&["member:a".to_string()]);

        assert_eq!(cache.len(), 1);
        let kept = cache.get("group:1:members", || async { Ok(20) }).await;
        assert_eq!(kept.into_result(), Ok(2));
    }

    #[tokio::test]
    async fn test_failed_get_link_does_not_link() {
        let config = config().build().unwrap();
        let cache: LocalCache<u32, String> = LocalCache::new(&config).unwrap();

        let lookup = cache
            .get_link("k", || async { Err("down".to_string()) }, &["other".to_string()])
            .await;
        assert!(lookup.result.is_err());

        cache.get("k", || async { Ok(1) }).await;
        cache.del(&["other".to_string()]);
        assert!(!cache.get("k", || async { Ok(2) }).await.was_miss);
    }

    #[tokio::test]
    async fn test_active_config_builds_and_stops() {
        let config = config()
            .with_active_eviction()
            .with_cleanup_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let cache: LocalCache<u32, String> = LocalCache::new(&config).unwrap();
        cache.stop();
        cache.stop();
    }

    #[test]
    fn test_active_config_without_runtime_fails() {
        let config = config().with_active_eviction().build().unwrap();
        let result = LocalCache::<u32, String>::new(&config);
        assert!(matches!(result, Err(CacheError::RuntimeUnavailable)));
    }
}
