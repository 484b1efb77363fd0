//! Background maintenance for the shared pipeline state.
//!
//! - `cache_sweep_task`: drops expired result cache entries
//! - `table_refresh_task`: reloads the table existence snapshot
//!
//! Both stop when the watch channel flips to `true` or its sender is dropped:
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(cache_sweep_task(cache, Duration::from_secs(60), shutdown_rx));
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

use quarry_storage::{ResultCache, TableDirectory, TableGate};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Counters collected by the background tasks.
#[derive(Debug, Default)]
pub struct JobMetrics {
    pub cycles: AtomicU64,
    pub items: AtomicU64,
    pub errors: AtomicU64,
}

/// Point-in-time copy of [`JobMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobMetricsSnapshot {
    pub cycles: u64,
    pub items: u64,
    pub errors: u64,
}

impl JobMetrics {
    pub fn snapshot(&self) -> JobMetricsSnapshot {
        JobMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Sweep expired cache entries every `period`. `items` counts removed entries.
pub async fn cache_sweep_task(
    cache: Arc<ResultCache>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<JobMetrics> {
    let metrics = Arc::new(JobMetrics::default());
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(period_secs = period.as_secs(), "cache sweep task started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender means the owner is gone.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("cache sweep task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                let removed = cache.sweep();
                metrics.items.fetch_add(removed as u64, Ordering::Relaxed);
                if removed > 0 {
                    tracing::debug!(removed, "expired cache entries swept");
                }
            }
        }
    }

    metrics
}

/// Reload the table snapshot every `period`. `items` holds the size of the
/// last loaded snapshot; failures keep the previous one.
pub async fn table_refresh_task(
    gate: Arc<TableGate>,
    directory: Arc<dyn TableDirectory>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<JobMetrics> {
    let metrics = Arc::new(JobMetrics::default());
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The runtime loads the snapshot before spawning this task.
    ticker.tick().await;

    tracing::info!(period_secs = period.as_secs(), "table refresh task started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender means the owner is gone.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("table refresh task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                match gate.refresh(directory.as_ref()).await {
                    Ok(count) => metrics.items.store(count as u64, Ordering::Relaxed),
                    Err(_) => {
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quarry_core::{
        CallerIdentity, ComplexityScore, ComplexityTier, ExecutionOutcome, QuarryResult,
        QuerySuccess, Role,
    };
    use quarry_storage::ResultCacheKey;
    use std::collections::HashSet;

    struct CountingDirectory {
        calls: AtomicU64,
    }

    #[async_trait]
    impl TableDirectory for CountingDirectory {
        async fn list_tables(&self) -> QuarryResult<HashSet<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..=n).map(|i| format!("t{}", i)).collect())
        }
    }

    fn success() -> ExecutionOutcome {
        ExecutionOutcome::Success(QuerySuccess {
            rows: vec![],
            row_count: 0,
            elapsed_ms: 0,
            complexity_tier: ComplexityTier::Low,
            complexity: ComplexityScore::default(),
            cached: false,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_sweep_removes_expired_entries() {
        let cache = Arc::new(ResultCache::new(Duration::from_secs(60), 10));
        let key = ResultCacheKey::new("SELECT 1", &CallerIdentity::new(Role::Admin, "u1"));
        cache.put_with_ttl(key, success(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(cache_sweep_task(Arc::clone(&cache), Duration::from_secs(1), rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let metrics = handle.await.unwrap().snapshot();
        assert!(metrics.cycles >= 1);
        assert_eq!(metrics.items, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_refresh_runs_on_interval() {
        let gate = Arc::new(TableGate::new(false));
        let directory = Arc::new(CountingDirectory {
            calls: AtomicU64::new(0),
        });

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(table_refresh_task(
            Arc::clone(&gate),
            directory.clone(),
            Duration::from_secs(10),
            rx,
        ));
        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();

        let metrics = handle.await.unwrap().snapshot();
        assert_eq!(metrics.cycles, 2);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.available_tables(), vec!["t0", "t1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cache_sweep_stops_when_sender_dropped() {
        let cache = Arc::new(ResultCache::new(Duration::from_secs(60), 10));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(cache_sweep_task(cache, Duration::from_secs(3600), rx));
        drop(tx);

        let finished = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(finished.is_ok(), "cache sweep kept running without a sender");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_table_refresh_stops_when_sender_dropped() {
        let gate = Arc::new(TableGate::new(false));
        let directory = Arc::new(CountingDirectory {
            calls: AtomicU64::new(0),
        });
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(table_refresh_task(gate, directory, Duration::from_secs(3600), rx));
        drop(tx);

        let metrics = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("table refresh kept running without a sender")
            .unwrap()
            .snapshot();
        assert_eq!(metrics.cycles, 0);
    }
}
