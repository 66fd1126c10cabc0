//! Moka Store - In-Process Fallback Store
//!
//! Bounded in-memory store used whenever the primary store is unconfigured,
//! unreachable at startup, or fails a write.

use anyhow::Result;
use moka::Expiry;
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Stored bytes with the TTL they were written with
#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

/// Evicts each entry at its own TTL, restarting the clock on overwrite
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Configuration for `MokaStore`
#[derive(Debug, Clone, Copy)]
pub struct MokaStoreConfig {
    /// Max number of entries held
    pub max_capacity: u64,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        Self { max_capacity: 2000 }
    }
}

/// Moka in-memory store with per-key TTL
///
/// Process-local: in a multi-instance deployment every instance holds its own
/// copy, so fallback-only operation is coherent per instance only.
pub struct MokaStore {
    cache: Cache<String, StoredValue>,
}

impl MokaStore {
    /// Create new Moka store
    pub fn new(config: MokaStoreConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        info!(
            capacity = config.max_capacity,
            "Moka fallback store initialized with per-key TTL"
        );

        Self { cache }
    }
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new(MokaStoreConfig::default())
    }
}

// ===== Trait Implementations =====

use crate::traits::StoreBackend;
use async_trait::async_trait;

#[async_trait]
impl StoreBackend for MokaStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).await.map(|stored| stored.bytes.to_vec()))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let stored = StoredValue {
            bytes: Arc::from(value),
            ttl,
        };
        self.cache.insert(key.to_string(), stored).await;
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[Moka] Cached key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.contains(pattern))
            .map(|(key, _)| key.to_string())
            .collect();
        debug!(pattern = %pattern, count = keys.len(), "[Moka] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn remove_bulk(&self, keys: &[String]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            if self.cache.remove(key).await.is_some() {
                removed += 1;
            }
        }
        debug!(count = removed, "[Moka] Removed keys in bulk");
        Ok(removed)
    }

    async fn key_count(&self) -> Result<usize> {
        Ok(self.cache.iter().count())
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_moka";
        let test_value = b"health_check_value";

        match self
            .set_with_ttl(test_key, test_value, Duration::from_secs(60))
            .await
        {
            Ok(()) => match self.get(test_key).await {
                Ok(Some(retrieved)) => {
                    let _ = self.remove(test_key).await;
                    retrieved == test_value
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "Moka"
    }
}
