//! Redis Store - Primary Store Backend
//!
//! Redis-based shared store, reachable from every dashboard instance.
//!
//! Every key is written under a namespace prefix (default `dashboard-cache:`) so
//! scans and key counts only see this cache's entries in a shared database.

use anyhow::{Context, Result, bail};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Prefix applied to every key unless [`RedisStore::with_namespace`] overrides it
pub const DEFAULT_NAMESPACE: &str = "dashboard-cache:";

/// Redis store with `ConnectionManager` for automatic reconnection
///
/// The client is created explicitly with [`RedisStore::connect`] and handed to the
/// cache facade; there is no process-wide connection. After [`RedisStore::close`]
/// every operation fails, which the facade treats like any other store outage.
pub struct RedisStore {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
    namespace: String,
    closed: AtomicBool,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with `PING`
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection string (e.g., `<redis://localhost:6379>`)
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    /// The error never contains the connection string.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting Redis primary store");

        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!("Redis primary store connected (ConnectionManager enabled)");

        Ok(Self {
            conn_manager,
            namespace: DEFAULT_NAMESPACE.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    /// Use `namespace` as the key prefix instead of [`DEFAULT_NAMESPACE`]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Key prefix in use
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn physical(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Stop using the connection
    ///
    /// In-flight commands complete; later commands fail with "store closed".
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Redis primary store closed");
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn connection(&self) -> Result<ConnectionManager> {
        if self.is_closed() {
            bail!("Redis primary store is closed");
        }
        Ok(self.conn_manager.clone())
    }
}

/// Build a `SCAN MATCH` glob for keys under `namespace` containing `pattern`
fn substring_glob(namespace: &str, pattern: &str) -> String {
    let mut glob = String::with_capacity(namespace.len() + pattern.len() + 2);
    push_escaped(&mut glob, namespace);
    glob.push('*');
    push_escaped(&mut glob, pattern);
    if !pattern.is_empty() {
        glob.push('*');
    }
    glob
}

fn push_escaped(glob: &mut String, literal: &str) {
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            glob.push('\\');
        }
        glob.push(ch);
    }
}

// ===== Trait Implementations =====

use crate::traits::StoreBackend;
use async_trait::async_trait;

#[async_trait]
impl StoreBackend for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection()?;
        let value: Option<Vec<u8>> = conn
            .get(self.physical(key))
            .await
            .with_context(|| format!("Redis GET failed for key '{key}'"))?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection()?;

        // SET EX rejects 0; keep at least one second
        let secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(self.physical(key), value, secs)
            .await
            .with_context(|| format!("Redis SET failed for key '{key}'"))?;
        debug!(key = %key, ttl_secs = %secs, "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        let removed: usize = conn.del(self.physical(key)).await?;
        Ok(removed > 0)
    }

    /// Uses Redis SCAN (cursor-based, non-blocking) rather than KEYS
    ///
    /// Returned keys have the namespace stripped.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        let glob = substring_glob(&self.namespace, pattern);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            // SCAN cursor MATCH glob COUNT 100
            let result: (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&glob)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            cursor = result.0;
            keys.extend(
                result
                    .1
                    .into_iter()
                    .filter_map(|key| key.strip_prefix(self.namespace.as_str()).map(str::to_string)),
            );

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn remove_bulk(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;
        let physical: Vec<String> = keys.iter().map(|key| self.physical(key)).collect();
        let count: usize = conn.del(physical).await?;
        debug!(count = count, "[Redis] Removed keys in bulk");
        Ok(count)
    }

    /// Counts keys under the namespace only, not the whole database
    async fn key_count(&self) -> Result<usize> {
        Ok(self.scan_keys("").await?.len())
    }

    async fn health_check(&self) -> bool {
        let Ok(mut conn) = self.connection() else {
            return false;
        };
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok_and(|pong| pong == "PONG")
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
