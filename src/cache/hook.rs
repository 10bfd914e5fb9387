//! Cache Hook Module
//!
//! Observability seam for cache traffic: hits, misses and delete outcomes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Hook Trait ==
/// Receives one notification per cache operation.
///
/// Called synchronously on the request path, so implementations must be cheap
/// and must not block. Atomic counter bumps are the intended use.
pub trait Hook: Send + Sync {
    /// A `get` was served from an existing entry.
    fn increment_hit(&self);
    /// A `get` had to run the fetch.
    fn increment_miss(&self);
    /// A `del` removed an entry.
    fn increment_del_hit(&self);
    /// A `del` found nothing to remove.
    fn increment_del_miss(&self);
}

// == Noop Hook ==
/// Default hook: ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl Hook for NoopHook {
    fn increment_hit(&self) {}

    fn increment_miss(&self) {}

    fn increment_del_hit(&self) {}

    fn increment_del_miss(&self) {}
}

// == Counting Hook ==
/// Hook backed by four independent atomic counters.
#[derive(Default)]
pub struct CountingHook {
    hits: AtomicU64,
    misses: AtomicU64,
    del_hits: AtomicU64,
    del_misses: AtomicU64,
}

impl CountingHook {
    /// Creates a hook with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Snapshot ==
    /// Reads all counters into a plain value.
    ///
    /// Counters are read one by one, so a snapshot taken under load is not a
    /// single atomic cut across all four.
    pub fn snapshot(&self) -> HookStats {
        HookStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            del_hits: self.del_hits.load(Ordering::Relaxed),
            del_misses: self.del_misses.load(Ordering::Relaxed),
        }
    }
}

impl Hook for CountingHook {
    fn increment_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_del_hit(&self) {
        self.del_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_del_miss(&self) {
        self.del_misses.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for CountingHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CountingHook").field(&self.snapshot()).finish()
    }
}

// == Hook Stats ==
/// Point-in-time copy of a [`CountingHook`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HookStats {
    /// Number of gets served from an existing entry
    pub hits: u64,
    /// Number of gets that ran the fetch
    pub misses: u64,
    /// Number of deletes that removed an entry
    pub del_hits: u64,
    /// Number of deletes of absent keys
    pub del_misses: u64,
}

impl HookStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no gets have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
