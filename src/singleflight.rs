//! Single-Flight Module
//!
//! Coalesces concurrent calls for the same key into one execution.
//!
//! The first caller for a key becomes the owner and runs the fetch; callers
//! that arrive while it is running wait and receive a clone of the owner's
//! result, errors included. Nothing is retained once the call completes: the
//! next caller starts a fresh fetch.
//!
//! If the owner's future is dropped before it finishes, its waiters are woken
//! empty-handed and one of them takes over with its own fetch.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::warn;

type Slot<V, E> = Option<Result<V, E>>;

// == Single Flight ==
/// Per-key call de-duplication.
///
/// # Example
/// ```
/// use localcache::SingleFlight;
///
/// # tokio_test::block_on(async {
/// let group: SingleFlight<&str, String, String> = SingleFlight::new();
/// let value = group
///     .work("user:123", || async { Ok("profile".to_string()) })
///     .await;
/// assert_eq!(value, Ok("profile".to_string()));
/// # });
/// ```
pub struct SingleFlight<K, V, E> {
    calls: Mutex<HashMap<K, watch::Receiver<Slot<V, E>>>>,
}

impl<K, V, E> SingleFlight<K, V, E> {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a call in flight.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if no call is in flight.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    // == Work ==
    /// Runs `fetch` unless a call for `key` is already running, in which case
    /// waits for that call and returns its result.
    pub async fn work<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let tx = loop {
            let mut rx = {
                let mut calls = self.calls.lock();
                match calls.entry(key.clone()) {
                    Entry::Occupied(call) => call.get().clone(),
                    Entry::Vacant(slot) => {
                        let (tx, rx) = watch::channel(None);
                        slot.insert(rx);
                        break tx;
                    }
                }
            };

            // a closed channel with no value means the owner was dropped
            let outcome = match rx.wait_for(Option::is_some).await {
                Ok(slot) => (*slot).clone(),
                Err(_) => None,
            };
            if let Some(result) = outcome {
                return result;
            }
        };

        let call = OwnedCall {
            calls: &self.calls,
            key,
            rx: tx.subscribe(),
            tx,
            done: false,
        };
        let result = fetch().await;
        call.complete(result.clone());
        result
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> fmt::Debug for SingleFlight<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.len())
            .finish()
    }
}

/// The owner's registration. Removes itself from the map when dropped.
struct OwnedCall<'a, K: Hash + Eq, V, E> {
    calls: &'a Mutex<HashMap<K, watch::Receiver<Slot<V, E>>>>,
    key: K,
    tx: watch::Sender<Slot<V, E>>,
    rx: watch::Receiver<Slot<V, E>>,
    done: bool,
}

impl<K: Hash + Eq, V, E> OwnedCall<'_, K, V, E> {
    fn complete(mut self, result: Result<V, E>) {
        self.tx.send_replace(Some(result));
        self.done = true;
    }
}

impl<K: Hash + Eq, V, E> Drop for OwnedCall<'_, K, V, E> {
    fn drop(&mut self) {
        if !self.done {
            warn!("Single-flight owner dropped before completion; waiters will retry");
        }
        let mut calls = self.calls.lock();
        if calls
            .get(&self.key)
            .is_some_and(|registered| registered.same_channel(&self.rx))
        {
            calls.remove(&self.key);
        }
        // `tx` drops after this, waking any waiter still parked on an empty slot
    }
}
