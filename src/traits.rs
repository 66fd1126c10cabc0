//! Store and Source Traits
//!
//! This module defines the two seams of the cache layer:
//!
//! - `StoreBackend`: contract every key-value store (Redis primary, Moka fallback)
//!   honors so the facade can drive them through one code path
//! - `AggregationSource`: contract for the upstream computations (Sheets, Magento,
//!   Postgres adapters) whose results are cached
//!
//! # Example: Custom Store
//!
//! ```rust,ignore
//! use dashboard_cache::{StoreBackend, async_trait};
//! use std::time::Duration;
//! use anyhow::Result;
//!
//! struct MyStore {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl StoreBackend for MyStore {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
//!         // Your implementation
//!     }
//!
//!     // ... implement the remaining methods
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::key::AggregationRequest;

/// Key-value store used by the cache facade
///
/// Implement this trait to plug a store into [`CacheFacade`](crate::CacheFacade).
/// Values are opaque bytes; the facade owns serialization.
///
/// # Error Semantics
///
/// Stores report failures through `Err`. The facade decides what a failure means
/// (a miss on read, a fallback write on write); stores never swallow errors themselves.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to support concurrent access across async tasks.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Get value by key
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - Value found
    /// * `Ok(None)` - Key not found or expired
    /// * `Err(e)` - Store unreachable or command failed
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set value with time-to-live
    ///
    /// Overwrites any existing value for `key`.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove a single key
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Key existed and was removed
    /// * `Ok(false)` - Key did not exist
    async fn remove(&self, key: &str) -> Result<bool>;

    /// List every key containing `pattern` as a substring
    ///
    /// An empty pattern matches every key.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove multiple keys at once
    ///
    /// # Returns
    ///
    /// Number of keys that existed and were removed.
    async fn remove_bulk(&self, keys: &[String]) -> Result<usize>;

    /// Number of keys currently held
    async fn key_count(&self) -> Result<usize>;

    /// Check if the store is operational
    async fn health_check(&self) -> bool;

    /// Get the name of this store (e.g., "Moka", "Redis")
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Upstream computation producing a cacheable payload for one data domain
///
/// One implementation exists per dashboard domain (catalog, ad spend, analytics
/// sessions, CRM, year-over-year...). The cache layer calls `fetch` exactly once
/// per cache miss and once per background refresh.
///
/// Implementations must be deterministic for identical requests within the
/// domain's staleness window; concurrent misses may call `fetch` more than once
/// and the last write wins.
///
/// # Example
///
/// ```rust,ignore
/// use dashboard_cache::{AggregationRequest, AggregationSource, async_trait};
///
/// struct CatalogSource { sheets: SheetsClient }
///
/// #[async_trait]
/// impl AggregationSource for CatalogSource {
///     async fn fetch(&self, request: &AggregationRequest) -> anyhow::Result<serde_json::Value> {
///         let rows = self.sheets.rows("catalog", request.start, request.end).await?;
///         Ok(serde_json::to_value(aggregate(rows))?)
///     }
/// }
/// ```
#[async_trait]
pub trait AggregationSource: Send + Sync {
    /// Compute the payload for `request`
    async fn fetch(&self, request: &AggregationRequest) -> Result<serde_json::Value>;
}
