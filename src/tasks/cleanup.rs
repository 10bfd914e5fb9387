//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries when a
//! cache runs in active eviction mode.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something that can drop its expired entries on demand.
pub trait Purge: Send + Sync {
    /// Removes expired entries and returns how many were removed.
    fn purge_expired(&self) -> usize;
}

/// Spawns a background task that periodically purges `target`.
///
/// The task only holds a weak reference, so it exits on its own once the
/// cache is dropped. The returned handle lets the owner stop it earlier.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(&Handle::current(), Arc::downgrade(&inner), interval);
/// // Later, on stop:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task<T>(runtime: &Handle, target: Weak<T>, interval: Duration) -> JoinHandle<()>
where
    T: Purge + 'static,
{
    runtime.spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(target) = target.upgrade() else {
                info!("Cache dropped, TTL cleanup task exiting");
                break;
            };
            let removed = target.purge_expired();

            if removed > 0 {
                debug!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingTarget {
        sweeps: AtomicUsize,
    }

    impl Purge for CountingTarget {
        fn purge_expired(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps_on_interval() {
        let target = Arc::new(CountingTarget::default());
        let handle = spawn_cleanup_task(
            &Handle::current(),
            Arc::downgrade(&target),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_exits_when_target_dropped() {
        let target = Arc::new(CountingTarget::default());
        let handle = spawn_cleanup_task(
            &Handle::current(),
            Arc::downgrade(&target),
            Duration::from_secs(1),
        );
        drop(target);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished(), "Task should exit once the target is gone");
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let target = Arc::new(CountingTarget::default());
        let handle = spawn_cleanup_task(
            &Handle::current(),
            Arc::downgrade(&target),
            Duration::from_secs(1),
        );

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
