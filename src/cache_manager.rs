//! Aggregation Cache Manager - Dashboard Read-Through Cache
//!
//! Turns an [`AggregationRequest`] into a cache key, picks the domain's policy,
//! classifies the stored entry and decides what the caller gets:
//!
//! ```text
//! Fresh                  -> cached data
//! Stale + revalidating   -> cached data (stale = true), refresh in background
//! Stale (fixed policy)   -> miss
//! Expired / absent       -> miss
//! ```
//!
//! On a miss, [`AggregationCacheManager::resolve`] calls the domain's source once
//! and stores the result. Cache failures never propagate past this layer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::entry::{CacheEntry, Freshness};
use crate::error::DashboardError;
use crate::facade::{CacheFacade, CacheStats};
use crate::key::{AggregationRequest, CacheKey};
use crate::policy::{DomainPolicy, PolicyTable};
use crate::refresh::{RefreshQueue, RefreshStats};
use crate::traits::AggregationSource;

/// Where returned data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Served from the cache (fresh or stale)
    Cache,
    /// Computed by the domain's source during this request
    Api,
    /// Nothing usable was cached
    Miss,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAggregation<T> {
    /// Cached payload, `None` on a miss
    pub data: Option<T>,
    /// `Cache` when `data` is set, `Miss` otherwise
    pub source: DataSource,
    /// Whether the payload is past its staleness window
    pub stale: bool,
}

impl<T> CachedAggregation<T> {
    fn hit(data: T, stale: bool) -> Self {
        Self {
            data: Some(data),
            source: DataSource::Cache,
            stale,
        }
    }

    fn miss() -> Self {
        Self {
            data: None,
            source: DataSource::Miss,
            stale: false,
        }
    }

    /// Whether the lookup returned data
    pub fn is_hit(&self) -> bool {
        self.data.is_some()
    }
}

/// Payload handed back to a dashboard requester
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResponse {
    pub data: serde_json::Value,
    pub source: DataSource,
    pub stale: bool,
}

struct ManagerInner {
    facade: CacheFacade,
    policies: PolicyTable,
    clock: Arc<dyn Clock>,
    refresh: RefreshQueue,
}

/// Aggregation Cache Manager
///
/// Cheap to clone; background refreshes hold a clone while they run.
#[derive(Clone)]
pub struct AggregationCacheManager {
    inner: Arc<ManagerInner>,
}

impl AggregationCacheManager {
    /// Create a manager
    pub fn new(
        facade: CacheFacade,
        policies: PolicyTable,
        clock: Arc<dyn Clock>,
        refresh: RefreshQueue,
    ) -> Self {
        info!(
            backend = ?facade.backend_kind(),
            domains = policies.domains.len(),
            "Aggregation cache manager initialized"
        );
        Self {
            inner: Arc::new(ManagerInner {
                facade,
                policies,
                clock,
                refresh,
            }),
        }
    }

    /// Policy applied to `request` today
    pub fn policy_for(&self, request: &AggregationRequest) -> DomainPolicy {
        self.inner
            .policies
            .resolve(&request.domain, request.end, self.inner.clock.today())
    }

    /// Look up the cached aggregation for `request`
    ///
    /// Never fails: store errors and undecodable entries count as a miss.
    /// Hit and miss counters reflect what is returned, so an entry that is read
    /// but too old to serve counts as a miss.
    pub async fn get_cached_aggregation<T>(&self, request: &AggregationRequest) -> CachedAggregation<T>
    where
        T: DeserializeOwned,
    {
        let cached = self.lookup(request).await;
        self.inner.facade.record_lookup(cached.is_hit());
        cached
    }

    async fn lookup<T>(&self, request: &AggregationRequest) -> CachedAggregation<T>
    where
        T: DeserializeOwned,
    {
        let key = request.cache_key();
        let Some(entry) = self.read_entry::<T>(&key).await else {
            return CachedAggregation::miss();
        };

        let policy = self.policy_for(request);
        match entry.freshness(self.inner.clock.now()) {
            Freshness::Fresh => {
                debug!(key = %key, domain = %request.domain, "Fresh cache hit");
                CachedAggregation::hit(entry.value, false)
            }
            Freshness::Stale if policy.stale_while_revalidate => {
                debug!(key = %key, domain = %request.domain, "Stale cache hit");
                CachedAggregation::hit(entry.value, true)
            }
            Freshness::Stale => {
                debug!(key = %key, domain = %request.domain, "Stale entry without revalidation, treating as miss");
                CachedAggregation::miss()
            }
            Freshness::Expired => {
                debug!(key = %key, domain = %request.domain, "Expired entry, treating as miss");
                CachedAggregation::miss()
            }
        }
    }

    /// Store `data` for `request` under the domain's policy
    ///
    /// Overwrites any existing entry and restarts its freshness window.
    pub async fn set_cached_aggregation<T>(&self, request: &AggregationRequest, data: &T)
    where
        T: Serialize,
    {
        let key = request.cache_key();
        let policy = self.policy_for(request);
        let entry = CacheEntry::new(
            data,
            self.inner.clock.now(),
            policy.ttl_secs,
            policy.stale_after_secs,
        );

        let value = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, domain = %request.domain, error = %e, "Failed to serialize aggregation, not cached");
                return;
            }
        };

        self.inner.facade.set(key.as_str(), &value, policy.ttl()).await;
        debug!(key = %key, domain = %request.domain, ttl_secs = policy.ttl_secs, "Stored aggregation");
    }

    /// Serve `request` from cache, computing it with `source` on a miss
    ///
    /// A stale hit returns immediately and schedules a background refresh.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Upstream`] if the source fails on a miss.
    pub async fn resolve(
        &self,
        request: &AggregationRequest,
        source: Arc<dyn AggregationSource>,
    ) -> Result<AggregationResponse, DashboardError> {
        let cached = self.get_cached_aggregation::<serde_json::Value>(request).await;

        if let Some(data) = cached.data {
            if cached.stale {
                self.schedule_refresh(request.clone(), source);
            }
            return Ok(AggregationResponse {
                data,
                source: DataSource::Cache,
                stale: cached.stale,
            });
        }

        let data = source.fetch(request).await.map_err(|e| {
            warn!(domain = %request.domain, error = %e, "Aggregation source failed on cache miss");
            DashboardError::upstream(&request.domain, &e)
        })?;

        self.set_cached_aggregation(request, &data).await;

        Ok(AggregationResponse {
            data,
            source: DataSource::Api,
            stale: false,
        })
    }

    /// Recompute `request` in the background and overwrite its entry
    ///
    /// Returns `false` if a refresh for the same key is already running.
    pub fn schedule_refresh(&self, request: AggregationRequest, source: Arc<dyn AggregationSource>) -> bool {
        let key = request.cache_key();
        let domain = request.domain.clone();
        let manager = self.clone();

        self.inner.refresh.schedule(key, &domain, async move {
            let data = source.fetch(&request).await?;
            manager.set_cached_aggregation(&request, &data).await;
            Ok(())
        })
    }

    /// Delete every entry whose key contains `pattern`
    pub async fn invalidate(&self, pattern: &str) -> usize {
        self.inner.facade.invalidate(pattern).await
    }

    /// Facade statistics
    pub async fn stats(&self) -> CacheStats {
        self.inner.facade.stats().await
    }

    /// Background refresh counters
    pub fn refresh_stats(&self) -> RefreshStats {
        self.inner.refresh.stats()
    }

    /// Wait for every scheduled refresh to finish
    pub async fn wait_for_refreshes(&self) {
        self.inner.refresh.wait_idle().await;
    }

    /// Wait for scheduled refreshes for at most `timeout`
    ///
    /// Returns `false` if some refresh was still running at the deadline.
    pub async fn wait_for_refreshes_timeout(&self, timeout: std::time::Duration) -> bool {
        self.inner.refresh.wait_idle_timeout(timeout).await
    }

    /// Check the active store
    pub async fn health_check(&self) -> bool {
        self.inner.facade.health_check().await
    }

    /// Clock used for freshness and date defaults
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Policy table in use
    pub fn policies(&self) -> &PolicyTable {
        &self.inner.policies
    }

    async fn read_entry<T>(&self, key: &CacheKey) -> Option<CacheEntry<T>>
    where
        T: DeserializeOwned,
    {
        let raw = self.inner.facade.load(key.as_str()).await?;
        match serde_json::from_value(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached entry does not match expected shape, treating as miss");
                None
            }
        }
    }
}
