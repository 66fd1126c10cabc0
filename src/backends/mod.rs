//! Store Implementations
//!
//! - **Moka** - in-process fallback store, always present
//! - **Redis** - shared primary store (feature: `redis`, on by default)
//!
//! # Usage
//!
//! ```rust,no_run
//! use dashboard_cache::backends::{MokaStore, MokaStoreConfig, RedisStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let fallback = MokaStore::new(MokaStoreConfig::default());
//! let primary = RedisStore::connect("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

pub mod moka_store;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use moka_store::{MokaStore, MokaStoreConfig};

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
