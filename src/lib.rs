//! Dashboard Cache
//!
//! Data-freshness cache layer for business-intelligence dashboards whose KPIs come
//! from slow upstream sources (spreadsheets, e-commerce APIs, SQL):
//! - **Primary Store**: shared Redis, optional
//! - **Fallback Store**: in-process Moka, always present
//! - **Per-Domain Policy**: TTL and staleness window per data domain, with a
//!   longer-lived override for historical ranges
//! - **Stale-While-Revalidate**: stale entries are served while a deduplicated,
//!   bounded background refresh recomputes them
//! - **Pattern Invalidation** and **Warmup**
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dashboard_cache::{AggregationRequest, CacheSystem, FnSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // REDIS_URL unset = fallback store only
//!     let cache = CacheSystem::from_env().await?;
//!
//!     let catalog = Arc::new(FnSource::new(|_request: AggregationRequest| async {
//!         Ok(serde_json::json!({"skus": 120}))
//!     }));
//!
//!     let request = AggregationRequest::new("catalog");
//!     let response = cache.manager().resolve(&request, catalog).await?;
//!     tracing::info!(source = ?response.source, "Catalog loaded");
//!
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Handler → Manager (key, policy, freshness) → Facade → Primary | Fallback
//!              ↓ miss                              ↑
//!           Source.fetch ─────── set ──────────────┘
//!              ↑ stale hit
//!           RefreshQueue (dedup, bounded)
//! ```

pub mod backends;
pub mod builder;
pub mod cache_manager;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod facade;
pub mod key;
pub mod policy;
pub mod refresh;
pub mod sources;
pub mod traits;
pub mod warmup;

#[cfg(feature = "http")]
pub mod http;

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

pub use backends::{MokaStore, MokaStoreConfig};
#[cfg(feature = "redis")]
pub use backends::RedisStore;
pub use builder::CacheSystemBuilder;
pub use cache_manager::{AggregationCacheManager, AggregationResponse, CachedAggregation, DataSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, Freshness};
pub use error::DashboardError;
pub use facade::{BackendKind, CacheBackend, CacheFacade, CacheStats};
pub use key::{AggregationRequest, CacheKey, View};
pub use policy::{DomainPolicy, HistoricalPolicy, PolicyTable};
pub use refresh::{RefreshConfig, RefreshQueue, RefreshStats};
pub use sources::{FnSource, SourceRegistry};
pub use traits::{AggregationSource, StoreBackend};
pub use warmup::{NamedRange, WarmupPlan, WarmupReport, WarmupResult, WarmupTarget};

// Re-export async_trait for user convenience
pub use async_trait::async_trait;

/// How long [`CacheSystem::shutdown`] waits for background refreshes
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Main entry point for the dashboard cache
///
/// Owns the aggregation manager and, when one was connected, the Redis primary
/// store so it can be closed on shutdown.
///
/// # Example
///
/// ```rust,no_run
/// use dashboard_cache::{CacheConfig, CacheSystem};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let cache = CacheSystem::connect(CacheConfig::default().with_redis_url("redis://localhost:6379")).await?;
///     let stats = cache.manager().stats().await;
///     tracing::info!(backend = ?stats.backend, keys = stats.key_count, "Cache ready");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CacheSystem {
    pub(crate) manager: AggregationCacheManager,
    #[cfg(feature = "redis")]
    pub(crate) redis: Option<std::sync::Arc<RedisStore>>,
}

impl CacheSystem {
    /// Build a cache system from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the configured policy file cannot be loaded. An
    /// unreachable primary store is not an error; the system runs on the fallback
    /// store instead.
    pub async fn connect(config: CacheConfig) -> Result<Self> {
        CacheSystemBuilder::new().with_config(config).build().await
    }

    /// Build a cache system from environment variables (see [`CacheConfig`])
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or the policy file cannot be loaded.
    pub async fn from_env() -> Result<Self> {
        Self::connect(CacheConfig::from_env()?).await
    }

    /// Aggregation manager (primary interface)
    pub fn manager(&self) -> &AggregationCacheManager {
        &self.manager
    }

    /// Check the active store
    pub async fn health_check(&self) -> bool {
        let healthy = self.manager.health_check().await;
        if healthy {
            info!("Dashboard cache health check passed");
        } else {
            warn!("Dashboard cache health check failed");
        }
        healthy
    }

    /// Wait up to [`SHUTDOWN_TIMEOUT`] for background refreshes, then close the
    /// primary store
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(SHUTDOWN_TIMEOUT).await;
    }

    /// Wait up to `timeout` for background refreshes, then close the primary store
    ///
    /// Refreshes still running at the deadline are abandoned; their writes fail
    /// once the store is closed.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        info!(timeout_ms = timeout.as_millis(), "Shutting down dashboard cache");
        if !self.manager.wait_for_refreshes_timeout(timeout).await {
            warn!(
                in_flight = self.manager.refresh_stats().in_flight,
                "Background refreshes still running at shutdown deadline"
            );
        }

        #[cfg(feature = "redis")]
        if let Some(redis) = &self.redis {
            redis.close();
        }
    }
}
