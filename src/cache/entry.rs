//! Cache Entry Module
//!
//! A single cache slot guarded by its own reader/writer lock, so a slow fetch
//! only blocks callers of that one key.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

/// Exclusive access to an entry while its fetch runs.
pub type FillGuard<V, E> = OwnedRwLockWriteGuard<Option<Result<V, E>>>;

// == Cache Entry ==
/// Shared handle to the result slot of one key.
///
/// Cloning the handle is cheap; all clones refer to the same slot. A slot
/// holding `None` has not been filled yet, or its filler went away before
/// storing anything.
pub struct CacheEntry<V, E> {
    slot: Arc<RwLock<Option<Result<V, E>>>>,
}

impl<V, E> CacheEntry<V, E> {
    // == Constructor ==
    /// Creates an empty, unlocked entry.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
        }
    }

    // == Lock For Fill ==
    /// Takes the write lock without waiting.
    ///
    /// Returns `None` if anyone else holds the lock, which cannot happen for
    /// an entry that has not been published yet.
    pub fn try_lock_for_fill(&self) -> Option<FillGuard<V, E>> {
        self.slot.clone().try_write_owned().ok()
    }

    // == Peek ==
    /// Returns a clone of a stored success without waiting.
    ///
    /// Used by eviction callbacks, which must never block the caller that
    /// triggered the eviction. In-flight and failed entries yield `None`.
    pub fn peek_value(&self) -> Option<V>
    where
        V: Clone,
    {
        match self.slot.try_read() {
            Ok(guard) => match &*guard {
                Some(Ok(v)) => Some(v.clone()),
                _ => None,
            },
            Err(_) => None,
        }
    }

    /// Returns true if both handles refer to the same slot.
    pub fn same_entry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<V: Clone, E: Clone> CacheEntry<V, E> {
    // == Read ==
    /// Waits for any in-flight fill and clones the stored result.
    pub async fn read(&self) -> Option<Result<V, E>> {
        self.slot.read().await.clone()
    }
}

impl<V, E> Clone for CacheEntry<V, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<V, E> Default for CacheEntry<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for CacheEntry<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("slot", &Arc::as_ptr(&self.slot))
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_entry_is_unpopulated() {
        let entry: CacheEntry<u32, String> = CacheEntry::new();
        assert_eq!(entry.read().await, None);
        assert_eq!(entry.peek_value(), None);
    }

    #[tokio::test]
    async fn test_fill_then_read() {
        let entry: CacheEntry<u32, String> = CacheEntry::new();
        {
            let mut guard = entry.try_lock_for_fill().unwrap();
            *guard = Some(Ok(7));
        }
        assert_eq!(entry.read().await, Some(Ok(7)));
        assert_eq!(entry.peek_value(), Some(7));
    }

    #[tokio::test]
    async fn test_second_fill_lock_refused() {
        let entry: CacheEntry<u32, String> = CacheEntry::new();
        let _guard = entry.try_lock_for_fill().unwrap();
        assert!(entry.try_lock_for_fill().is_none());
        // peek must not block behind the writer
        assert_eq!(entry.peek_value(), None);
    }

    #[tokio::test]
    async fn test_peek_ignores_errors() {
        let entry: CacheEntry<u32, String> = CacheEntry::new();
        *entry.try_lock_for_fill().unwrap() = Some(Err("boom".into()));
        assert_eq!(entry.peek_value(), None);
        assert_eq!(entry.read().await, Some(Err("boom".into())));
    }

    #[tokio::test]
    async fn test_clones_share_the_slot() {
        let entry: CacheEntry<u32, String> = CacheEntry::new();
        let other = entry.clone();
        assert!(entry.same_entry(&other));
        assert!(!entry.same_entry(&CacheEntry::new()));

        *other.try_lock_for_fill().unwrap() = Some(Ok(3));
        assert_eq!(entry.read().await, Some(Ok(3)));
    }

    #[tokio::test]
    async fn test_reader_waits_for_writer() {
        let entry: CacheEntry<u32, String> = CacheEntry::new();
        let mut guard = entry.try_lock_for_fill().unwrap();

        let reader = {
            let entry = entry.clone();
            tokio::spawn(async move { entry.read().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        *guard = Some(Ok(42));
        drop(guard);

        assert_eq!(reader.await.unwrap(), Some(Ok(42)));
    }
}
