//! Configuration Module
//!
//! Immutable cache settings, built once at startup through [`ConfigBuilder`]
//! or loaded from environment variables.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Hook, NoopHook};
use crate::error::{CacheError, Result};

/// Callback run with a batch of keys before they are deleted locally.
///
/// Typically used to propagate the invalidation to other processes.
pub type PreDeleteFn = Arc<dyn Fn(&[String]) + Send + Sync>;

// == Defaults ==
const DEFAULT_LOCAL_SLOT_NUM: usize = 500;
const DEFAULT_LOCAL_SLOT_SIZE: usize = 20_000;
const DEFAULT_LINK_SLOT_NUM: usize = 500;
const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(60);
const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(5);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// How expired entries leave the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionMode {
    /// A background task purges expired entries on a fixed interval
    Active,
    /// Expiry is only checked when an entry is next touched
    #[default]
    Lazy,
}

/// Cache configuration.
///
/// Cloning is cheap; the hook and callbacks are shared.
#[derive(Clone)]
pub struct Config {
    /// Number of independent LRU shards; zero disables local caching
    pub local_slot_num: usize,
    /// Capacity of each shard
    pub local_slot_size: usize,
    /// Number of link index slots; zero disables key linking
    pub link_slot_num: usize,
    /// Active or lazy expiry
    pub eviction: EvictionMode,
    /// Lifetime of a successfully fetched entry
    pub success_ttl: Duration,
    /// Lifetime configured for failed fetches; see [`Config::failure_ttl`]
    pub failure_ttl: Duration,
    /// Sweep period of the active eviction task
    pub cleanup_interval: Duration,
    /// Observability hook
    pub hook: Arc<dyn Hook>,
    /// Callbacks run before a delete, in registration order
    pub pre_delete: Vec<PreDeleteFn>,
}

impl Config {
    /// Starts a builder over the documented defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LOCALCACHE_SLOT_NUM` - Number of shards (default: 500)
    /// - `LOCALCACHE_SLOT_SIZE` - Capacity per shard (default: 20000)
    /// - `LOCALCACHE_LINK_SLOT_NUM` - Link index slots (default: 500)
    /// - `LOCALCACHE_ACTIVE_EVICT` - `true` or `1` for active eviction (default: lazy)
    /// - `LOCALCACHE_SUCCESS_TTL_MS` - Success TTL in milliseconds (default: 60000)
    /// - `LOCALCACHE_FAILURE_TTL_MS` - Failure TTL in milliseconds (default: 5000)
    /// - `LOCALCACHE_CLEANUP_INTERVAL_MS` - Active sweep period in milliseconds (default: 1000)
    ///
    /// Unset or unparsable variables keep their default. The result is
    /// validated exactly like [`ConfigBuilder::build`].
    pub fn from_env() -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(n) = env_parse("LOCALCACHE_SLOT_NUM") {
            builder = builder.with_local_slot_num(n);
        }
        if let Some(n) = env_parse("LOCALCACHE_SLOT_SIZE") {
            builder = builder.with_local_slot_size(n);
        }
        if let Some(n) = env_parse("LOCALCACHE_LINK_SLOT_NUM") {
            builder = builder.with_link_slot_num(n);
        }
        if let Ok(v) = env::var("LOCALCACHE_ACTIVE_EVICT") {
            if matches!(v.trim(), "1" | "true" | "TRUE" | "True") {
                builder = builder.with_active_eviction();
            }
        }
        if let Some(ms) = env_parse("LOCALCACHE_SUCCESS_TTL_MS") {
            builder = builder.with_success_ttl(Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse("LOCALCACHE_FAILURE_TTL_MS") {
            builder = builder.with_failure_ttl(Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse("LOCALCACHE_CLEANUP_INTERVAL_MS") {
            builder = builder.with_cleanup_interval(Duration::from_millis(ms));
        }

        builder.build()
    }

    /// Returns true when the local LRU layer is enabled.
    pub fn local_enabled(&self) -> bool {
        self.local_slot_num > 0
    }

    /// Returns true when key linking is enabled.
    pub fn link_enabled(&self) -> bool {
        self.link_slot_num > 0
    }

    /// Configured lifetime for failed fetches.
    ///
    /// The cache never retains a failed fetch: its placeholder is removed as
    /// soon as the fetch returns, so the next caller retries immediately. The
    /// value is validated and exposed for callers that apply their own
    /// negative caching upstream.
    pub fn failure_ttl(&self) -> Duration {
        self.failure_ttl
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().into_config()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("local_slot_num", &self.local_slot_num)
            .field("local_slot_size", &self.local_slot_size)
            .field("link_slot_num", &self.link_slot_num)
            .field("eviction", &self.eviction)
            .field("success_ttl", &self.success_ttl)
            .field("failure_ttl", &self.failure_ttl)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("pre_delete", &self.pre_delete.len())
            .finish_non_exhaustive()
    }
}

// == Config Builder ==
/// Applies named options in order over the defaults.
pub struct ConfigBuilder {
    local_slot_num: usize,
    local_slot_size: usize,
    link_slot_num: usize,
    eviction: EvictionMode,
    success_ttl: Duration,
    failure_ttl: Duration,
    cleanup_interval: Duration,
    hook: Arc<dyn Hook>,
    pre_delete: Vec<PreDeleteFn>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            local_slot_num: DEFAULT_LOCAL_SLOT_NUM,
            local_slot_size: DEFAULT_LOCAL_SLOT_SIZE,
            link_slot_num: DEFAULT_LINK_SLOT_NUM,
            eviction: EvictionMode::Lazy,
            success_ttl: DEFAULT_SUCCESS_TTL,
            failure_ttl: DEFAULT_FAILURE_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            hook: Arc::new(NoopHook),
            pre_delete: Vec::with_capacity(2),
        }
    }
}

impl ConfigBuilder {
    /// Purge expired entries from a background task.
    pub fn with_active_eviction(mut self) -> Self {
        self.eviction = EvictionMode::Active;
        self
    }

    /// Only drop expired entries when they are next touched.
    pub fn with_lazy(mut self) -> Self {
        self.eviction = EvictionMode::Lazy;
        self
    }

    /// Sets the number of LRU shards.
    pub fn with_local_slot_num(mut self, local_slot_num: usize) -> Self {
        self.local_slot_num = local_slot_num;
        self
    }

    /// Sets the capacity of each shard.
    pub fn with_local_slot_size(mut self, local_slot_size: usize) -> Self {
        self.local_slot_size = local_slot_size;
        self
    }

    /// Sets the number of link index slots.
    pub fn with_link_slot_num(mut self, link_slot_num: usize) -> Self {
        self.link_slot_num = link_slot_num;
        self
    }

    /// Turns the local LRU layer off; every get goes straight to its fetch.
    pub fn with_local_disabled(self) -> Self {
        self.with_local_slot_num(0)
    }

    /// Turns key linking off.
    pub fn with_link_disabled(self) -> Self {
        self.with_link_slot_num(0)
    }

    /// Sets the lifetime of successfully fetched entries.
    pub fn with_success_ttl(mut self, ttl: Duration) -> Self {
        self.success_ttl = ttl;
        self
    }

    /// Sets the failure lifetime.
    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    /// Sets the sweep period used by active eviction.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Replaces the default no-op hook.
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hook = hook;
        self
    }

    /// Appends a callback run before keys are deleted.
    pub fn with_pre_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.pre_delete.push(Arc::new(f));
        self
    }

    // == Build ==
    /// Validates the options and freezes them into a [`Config`].
    pub fn build(self) -> Result<Config> {
        if self.success_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "success_ttl must be greater than zero".to_string(),
            ));
        }
        if self.failure_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "failure_ttl must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval must be greater than zero".to_string(),
            ));
        }
        if self.local_slot_num > 0 && self.local_slot_size == 0 {
            return Err(CacheError::InvalidConfig(
                "local_slot_size must be greater than zero while local caching is enabled"
                    .to_string(),
            ));
        }

        Ok(self.into_config())
    }

    fn into_config(self) -> Config {
        Config {
            local_slot_num: self.local_slot_num,
            local_slot_size: self.local_slot_size,
            link_slot_num: self.link_slot_num,
            eviction: self.eviction,
            success_ttl: self.success_ttl,
            failure_ttl: self.failure_ttl,
            cleanup_interval: self.cleanup_interval,
            hook: self.hook,
            pre_delete: self.pre_delete,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
