//! Cache Facade - Unified Store Operations
//!
//! One API over whichever store is active. The active store is fixed at
//! construction time by the [`CacheBackend`] variant:
//!
//! ```text
//!              get                 set                      invalidate / stats
//! Primary   -> primary (err=miss)  primary, err -> fallback  primary
//! Fallback  -> fallback            fallback                  fallback
//! ```
//!
//! A primary-configured facade never reads the fallback store: doing so would
//! serve entries from a second, possibly divergent cache. Writes land in the
//! fallback only so a computed value is not thrown away while the primary is down.
//!
//! No operation returns an error. Store failures are logged and degrade to
//! miss behavior because every caller can recompute from the source.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backends::MokaStore;
use crate::traits::StoreBackend;

/// Which store a facade operates on
pub enum CacheBackend {
    /// Shared primary store, with the fallback store receiving failed writes
    Primary {
        store: Arc<dyn StoreBackend>,
        fallback: Arc<MokaStore>,
    },
    /// In-process store only
    Fallback(Arc<MokaStore>),
}

impl CacheBackend {
    /// Kind of the active store
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Primary { .. } => BackendKind::Primary,
            Self::Fallback(_) => BackendKind::Fallback,
        }
    }

    fn active(&self) -> &dyn StoreBackend {
        match self {
            Self::Primary { store, .. } => store.as_ref(),
            Self::Fallback(store) => store.as_ref(),
        }
    }
}

/// Backend label reported in statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Primary,
    Fallback,
}

/// Facade statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub backend: BackendKind,
    pub key_count: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups that were served from the cache
    pub hit_rate: f64,
    pub sets: u64,
    /// Writes redirected to the fallback store after a primary failure
    pub fallback_writes: u64,
}

/// Cache Facade - get/set/invalidate/stats over the active store
pub struct CacheFacade {
    backend: CacheBackend,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    fallback_writes: AtomicU64,
}

impl CacheFacade {
    /// Create a facade over `backend`
    pub fn new(backend: CacheBackend) -> Self {
        info!(backend = ?backend.kind(), store = backend.active().name(), "Cache facade initialized");
        Self {
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            fallback_writes: AtomicU64::new(0),
        }
    }

    /// Facade over a fresh fallback store only
    pub fn fallback_only(fallback: Arc<MokaStore>) -> Self {
        Self::new(CacheBackend::Fallback(fallback))
    }

    /// Kind of the active store
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Get a value
    ///
    /// Returns `None` on a miss, on a store failure, and on bytes that are not JSON.
    /// Counts the lookup as a hit or a miss.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let value = self.load(key).await;
        self.record_lookup(value.is_some());
        value
    }

    /// Read and decode a value without touching the hit/miss counters
    ///
    /// For callers that decide after reading whether the value can be served,
    /// and record that decision with [`record_lookup`](Self::record_lookup).
    pub(crate) async fn load(&self, key: &str) -> Option<serde_json::Value> {
        let store = self.backend.active();

        match store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key = %key, store = store.name(), "Cache read");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, store = store.name(), error = %e, "Undecodable cache value, treating as miss");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, store = store.name(), "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, store = store.name(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Count one lookup as served (`hit`) or not
    pub(crate) fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Store a value with a time-to-live
    pub async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache value, skipping write");
                return;
            }
        };

        match &self.backend {
            CacheBackend::Primary { store, fallback } => {
                match store.set_with_ttl(key, &bytes, ttl).await {
                    Ok(()) => {
                        self.sets.fetch_add(1, Ordering::Relaxed);
                        debug!(key = %key, ttl_secs = ttl.as_secs(), store = store.name(), "Cached value");
                    }
                    Err(e) => {
                        warn!(key = %key, store = store.name(), error = %e, "Primary write failed, writing to fallback store");
                        self.fallback_writes.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = fallback.set_with_ttl(key, &bytes, ttl).await {
                            warn!(key = %key, error = %e, "Fallback write failed");
                        }
                    }
                }
            }
            CacheBackend::Fallback(store) => match store.set_with_ttl(key, &bytes, ttl).await {
                Ok(()) => {
                    self.sets.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, ttl_secs = ttl.as_secs(), store = store.name(), "Cached value");
                }
                Err(e) => warn!(key = %key, store = store.name(), error = %e, "Cache write failed"),
            },
        }
    }

    /// Delete every key containing `pattern`
    ///
    /// Returns the number of keys deleted. An empty pattern matches every key.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let store = self.backend.active();

        let keys = match store.scan_keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern = %pattern, store = store.name(), error = %e, "Key scan failed, nothing invalidated");
                return 0;
            }
        };

        if keys.is_empty() {
            info!(pattern = %pattern, count = 0, "Invalidated keys matching pattern");
            return 0;
        }

        match store.remove_bulk(&keys).await {
            Ok(count) => {
                info!(pattern = %pattern, count = count, "Invalidated keys matching pattern");
                count
            }
            Err(e) => {
                warn!(pattern = %pattern, store = store.name(), error = %e, "Bulk delete failed");
                0
            }
        }
    }

    /// Current statistics
    pub async fn stats(&self) -> CacheStats {
        let store = self.backend.active();
        let key_count = store.key_count().await.unwrap_or_else(|e| {
            warn!(store = store.name(), error = %e, "Key count failed");
            0
        });

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups > 0 {
            (hits as f64 / lookups as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            backend: self.backend.kind(),
            key_count,
            hits,
            misses,
            hit_rate,
            sets: self.sets.load(Ordering::Relaxed),
            fallback_writes: self.fallback_writes.load(Ordering::Relaxed),
        }
    }

    /// Check the active store
    pub async fn health_check(&self) -> bool {
        let store = self.backend.active();
        let healthy = store.health_check().await;
        if !healthy {
            warn!(store = store.name(), "Cache store health check failed");
        }
        healthy
    }
}
