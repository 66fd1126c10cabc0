//! Background refresh of stale entries
//!
//! A stale hit is served immediately; the recomputation runs here, detached from
//! the request that triggered it. Refreshes are keyed by cache key:
//!
//! - while a refresh for a key is in flight, further schedules for it are skipped
//! - at most `max_concurrent` refreshes run at once; the rest wait for a permit
//!   inside their own task, so `schedule` never blocks
//!
//! Failures are logged and counted. Nobody awaits a refresh, so there is no one
//! to return an error to.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info_span};

use crate::key::CacheKey;

/// Default cap on concurrently running refreshes
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 4;

/// Configuration for [`RefreshQueue`]
#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    /// Max refreshes running at once (minimum 1)
    pub max_concurrent: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_REFRESH_CONCURRENCY,
        }
    }
}

/// Refresh counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Refreshes accepted and spawned
    pub spawned: u64,
    /// Schedules skipped because the key was already refreshing
    pub deduplicated: u64,
    /// Refreshes that finished successfully
    pub completed: u64,
    /// Refreshes whose task returned an error
    pub failed: u64,
    /// Refreshes currently queued or running
    pub in_flight: usize,
}

/// Removes a key from the in-flight set when its task ends, including on panic
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<CacheKey, Instant>,
    key: &'a CacheKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.key);
    }
}

struct RefreshQueueInner {
    in_flight: DashMap<CacheKey, Instant>,
    permits: Semaphore,
    spawned: AtomicU64,
    deduplicated: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Deduplicating, bounded queue of detached refresh tasks
///
/// Cheap to clone; clones share the same in-flight set and permits.
#[derive(Clone)]
pub struct RefreshQueue {
    inner: Arc<RefreshQueueInner>,
}

impl RefreshQueue {
    /// Create a queue
    pub fn new(config: RefreshConfig) -> Self {
        Self {
            inner: Arc::new(RefreshQueueInner {
                in_flight: DashMap::new(),
                permits: Semaphore::new(config.max_concurrent.max(1)),
                spawned: AtomicU64::new(0),
                deduplicated: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Schedule a refresh of `key` for `domain`
    ///
    /// Returns `true` if the task was spawned, `false` if a refresh for the same
    /// key was already in flight and this one was dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, key: CacheKey, domain: &str, task: F) -> bool
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => {
                self.inner.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, domain = %domain, "Refresh already in flight, skipping");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
            }
        }

        self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("cache_refresh", key = %key, domain = %domain);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(
            async move {
                let _guard = InFlightGuard {
                    in_flight: &inner.in_flight,
                    key: &key,
                };

                let result = match inner.permits.acquire().await {
                    Ok(_permit) => task.await,
                    Err(e) => Err(anyhow::anyhow!("refresh permits closed: {e}")),
                };

                let elapsed_ms = inner
                    .in_flight
                    .get(&key)
                    .map(|started| started.elapsed().as_millis());

                match result {
                    Ok(()) => {
                        inner.completed.fetch_add(1, Ordering::Relaxed);
                        debug!(elapsed_ms = ?elapsed_ms, "Background refresh completed");
                    }
                    Err(e) => {
                        inner.failed.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, elapsed_ms = ?elapsed_ms, "Background refresh failed");
                    }
                }
            }
            .instrument(span),
        );

        true
    }

    /// Whether a refresh for `key` is queued or running
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Wait until no refresh is queued or running
    pub async fn wait_idle(&self) {
        while !self.inner.in_flight.is_empty() {
            tokio::task::yield_now().await;
        }
    }

    /// Wait until idle or until `timeout` passes
    ///
    /// Returns `true` if every refresh finished in time. Refreshes still running
    /// at the deadline are left running.
    pub async fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }

    /// Current counters
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            spawned: self.inner.spawned.load(Ordering::Relaxed),
            deduplicated: self.inner.deduplicated.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.len(),
        }
    }
}

impl Default for RefreshQueue {
    fn default() -> Self {
        Self::new(RefreshConfig::default())
    }
}
