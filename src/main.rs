//! localcache - stampede simulation
//!
//! Hammers a small set of hot keys from many concurrent tasks through a
//! [`LocalCache`] backed by a slow fake upstream, then reports how many
//! upstream calls were actually made and the hook counters.
//!
//! Configuration comes from the `LOCALCACHE_*` environment variables; see
//! [`Config::from_env`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use localcache::{Config, CountingHook, LocalCache};

const TASKS: usize = 256;
const ROUNDS: usize = 20;
const HOT_KEYS: usize = 8;
const UPSTREAM_LATENCY: Duration = Duration::from_millis(25);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "localcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting localcache stampede simulation");

    let base = Config::from_env().context("invalid LOCALCACHE_* configuration")?;
    info!("Configuration loaded: {:?}", base);

    let hook = Arc::new(CountingHook::new());
    let config = Config {
        hook: hook.clone(),
        ..base
    };
    let cache: Arc<LocalCache<String, String>> =
        Arc::new(LocalCache::new(&config).context("failed to build cache")?);

    let upstream_calls = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let mut handles = Vec::with_capacity(TASKS);
    for task in 0..TASKS {
        let cache = cache.clone();
        let upstream_calls = upstream_calls.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let key = format!("user:{}", (task + round) % HOT_KEYS);
                let upstream_calls = upstream_calls.clone();
                let owner = key.clone();
                let result = cache
                    .get(&key, || async move {
                        upstream_calls.fetch_add(1, Ordering::Relaxed);
                        tokio::time::sleep(UPSTREAM_LATENCY).await;
                        Ok::<_, String>(format!("profile of {owner}"))
                    })
                    .await
                    .into_result();
                if let Err(err) = result {
                    tracing::warn!("Upstream failed: {}", err);
                }
            }
        }));
    }

    for handle in handles {
        handle.await.context("simulation task panicked")?;
    }
    cache.stop();

    info!(
        "Served {} lookups with {} upstream calls in {:?}",
        TASKS * ROUNDS,
        upstream_calls.load(Ordering::Relaxed),
        started.elapsed()
    );

    let stats = hook.snapshot();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!("Hit rate: {:.4}", stats.hit_rate());

    Ok(())
}
