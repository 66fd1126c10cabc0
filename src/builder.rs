//! Cache System Builder
//!
//! Wires stores, policy table, clock and refresh queue into a [`CacheSystem`].
//!
//! # Example: From Environment
//!
//! ```rust,no_run
//! use dashboard_cache::{CacheConfig, CacheSystemBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheSystemBuilder::new()
//!         .with_config(CacheConfig::from_env()?)
//!         .build()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom Primary Store
//!
//! ```rust,ignore
//! use dashboard_cache::CacheSystemBuilder;
//! use std::sync::Arc;
//!
//! let cache = CacheSystemBuilder::new()
//!     .with_primary(Arc::new(MyStore::new()))
//!     .build()
//!     .await?;
//! ```

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backends::MokaStore;
use crate::cache_manager::AggregationCacheManager;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::facade::{CacheBackend, CacheFacade};
use crate::policy::PolicyTable;
use crate::refresh::RefreshQueue;
use crate::traits::StoreBackend;
use crate::CacheSystem;

#[cfg(feature = "redis")]
use crate::backends::RedisStore;

/// Builder for [`CacheSystem`]
///
/// # Default Behavior
///
/// - **Primary**: Redis at `config.redis_url` when set, otherwise none
/// - **Fallback**: Moka sized by `config.fallback`
/// - **Policies**: `config.policy_file`, otherwise the built-in table
/// - **Clock**: system time
#[derive(Default)]
pub struct CacheSystemBuilder {
    config: CacheConfig,
    primary: Option<Arc<dyn StoreBackend>>,
    policies: Option<PolicyTable>,
    clock: Option<Arc<dyn Clock>>,
}

impl CacheSystemBuilder {
    /// Create a builder with default configuration (fallback store only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for store URLs, capacities and the policy file
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `store` as the primary store instead of connecting to `config.redis_url`
    #[must_use]
    pub fn with_primary(mut self, store: Arc<dyn StoreBackend>) -> Self {
        self.primary = Some(store);
        self
    }

    /// Use `policies` instead of loading them from configuration
    #[must_use]
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Read time from `clock`
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the cache system
    ///
    /// A primary store that cannot be reached is logged and the system starts in
    /// fallback mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured policy file cannot be loaded.
    pub async fn build(self) -> Result<CacheSystem> {
        info!(config = ?self.config, "Building dashboard cache system");

        let policies = match self.policies {
            Some(policies) => policies,
            None => self.config.load_policies()?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let fallback = Arc::new(MokaStore::new(self.config.fallback));

        #[cfg(feature = "redis")]
        let mut redis = None;

        let backend = match self.primary {
            Some(store) => {
                info!(store = store.name(), "Using custom primary store");
                CacheBackend::Primary { store, fallback }
            }
            None => match self.config.redis_url.as_deref() {
                #[cfg(feature = "redis")]
                Some(url) => match RedisStore::connect(url).await {
                    Ok(store) => {
                        let store = Arc::new(store);
                        redis = Some(Arc::clone(&store));
                        CacheBackend::Primary { store, fallback }
                    }
                    Err(e) => {
                        warn!(error = %e, "Primary store unavailable, running on fallback store");
                        CacheBackend::Fallback(fallback)
                    }
                },
                #[cfg(not(feature = "redis"))]
                Some(_) => {
                    warn!("Primary store URL set but the `redis` feature is disabled, running on fallback store");
                    CacheBackend::Fallback(fallback)
                }
                None => {
                    info!("No primary store configured, running on fallback store");
                    CacheBackend::Fallback(fallback)
                }
            },
        };

        let manager = AggregationCacheManager::new(
            CacheFacade::new(backend),
            policies,
            clock,
            RefreshQueue::new(self.config.refresh),
        );

        info!("Dashboard cache system initialized");

        Ok(CacheSystem {
            manager,
            #[cfg(feature = "redis")]
            redis,
        })
    }
}
