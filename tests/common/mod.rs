//! Common utilities for integration tests
//!
//! - Redis connection helpers
//! - Manual clock and manager setup
//! - Scriptable aggregation sources and stores

#![allow(dead_code)]

use anyhow::{Result, bail};
use chrono::{TimeZone, Utc};
use dashboard_cache::{
    AggregationCacheManager, AggregationRequest, AggregationSource, CacheBackend, CacheFacade,
    ManualClock, MokaStore, PolicyTable, RefreshQueue, StoreBackend, async_trait,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Unique domain name so Redis-backed tests do not see each other's keys
pub fn test_domain(name: &str) -> String {
    format!("test-{}-{}", name, rand::random::<u32>())
}

/// Clock frozen at 2024-06-10 09:00 UTC
pub fn manual_clock() -> Arc<ManualClock> {
    let start = Utc
        .with_ymd_and_hms(2024, 6, 10, 9, 0, 0)
        .single()
        .expect("valid start time");
    Arc::new(ManualClock::new(start))
}

/// Manager on a fresh fallback store with the built-in policies
pub fn fallback_manager(clock: Arc<ManualClock>) -> AggregationCacheManager {
    AggregationCacheManager::new(
        CacheFacade::fallback_only(Arc::new(MokaStore::default())),
        PolicyTable::default(),
        clock,
        RefreshQueue::default(),
    )
}

/// Manager whose primary store is `primary`, writing failures to `fallback`
pub fn primary_manager(
    primary: Arc<dyn StoreBackend>,
    fallback: Arc<MokaStore>,
    clock: Arc<ManualClock>,
) -> AggregationCacheManager {
    AggregationCacheManager::new(
        CacheFacade::new(CacheBackend::Primary {
            store: primary,
            fallback,
        }),
        PolicyTable::default(),
        clock,
        RefreshQueue::default(),
    )
}

/// Aggregation source that counts calls and can be gated or made to fail
///
/// Each successful call returns `{"domain": ..., "version": n}` where `n` is the
/// call number, so tests can tell a refreshed value from the original.
#[derive(Default)]
pub struct CountingSource {
    calls: AtomicUsize,
    failing: AtomicBool,
    gate: Option<Notify>,
}

impl CountingSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Source whose calls block until [`release`](Self::release)
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Notify::new()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Let every waiting call (and the next one) proceed
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_waiters();
            gate.notify_one();
        }
    }
}

#[async_trait]
impl AggregationSource for CountingSource {
    async fn fetch(&self, request: &AggregationRequest) -> Result<serde_json::Value> {
        let version = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.failing.load(Ordering::SeqCst) {
            bail!("{} upstream unavailable", request.domain);
        }

        Ok(serde_json::json!({
            "domain": request.domain,
            "version": version,
        }))
    }
}

/// Store that can be switched into a failing state
#[derive(Default)]
pub struct SwitchableStore {
    inner: MokaStore,
    down: AtomicBool,
}

impl SwitchableStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for SwitchableStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.check()?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.remove(key).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check()?;
        self.inner.scan_keys(pattern).await
    }

    async fn remove_bulk(&self, keys: &[String]) -> Result<usize> {
        self.check()?;
        self.inner.remove_bulk(keys).await
    }

    async fn key_count(&self) -> Result<usize> {
        self.check()?;
        self.inner.key_count().await
    }

    async fn health_check(&self) -> bool {
        self.check().is_ok()
    }

    fn name(&self) -> &'static str {
        "Switchable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_generation() {
        let a = test_domain("crm");
        let b = test_domain("crm");
        assert_ne!(a, b, "Domains should be unique");
        assert!(a.starts_with("test-crm-"));
    }
}
