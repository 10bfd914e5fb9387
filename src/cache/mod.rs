//! Cache Module
//!
//! Provides the expiring, stampede-protected LRU cache, its sharded form, and
//! the hook it reports to.

mod entry;
mod expiration_lru;
mod hook;
mod shard;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use expiration_lru::{EvictCallback, ExpirationLru, ExpirationLruBuilder, Lookup};
pub use hook::{CountingHook, Hook, HookStats, NoopHook};
pub use shard::{ShardSelector, ShardedLru};
pub use store::{BoundedStore, Lookup as StoreLookup};
