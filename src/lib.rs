//! localcache - process-local cache for request-heavy backends
//!
//! Provides single-flight call coalescing and an expiring LRU cache with
//! built-in stampede protection, sharded and wired together from one
//! [`Config`].

pub mod cache;
pub mod config;
pub mod error;
pub mod link;
pub mod local;
pub mod singleflight;
pub mod tasks;

pub use cache::{CountingHook, ExpirationLru, Hook, HookStats, Lookup, NoopHook};
pub use config::{Config, ConfigBuilder, EvictionMode};
pub use error::{CacheError, Result};
pub use local::LocalCache;
pub use singleflight::SingleFlight;
