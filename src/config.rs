//! Cache configuration
//!
//! | Variable                    | Meaning                                      | Default    |
//! |-----------------------------|----------------------------------------------|------------|
//! | `REDIS_URL`                 | Primary store URL; absent or empty = fallback only | unset |
//! | `CACHE_FALLBACK_CAPACITY`   | Max entries in the in-process store          | 2000       |
//! | `CACHE_REFRESH_CONCURRENCY` | Max background refreshes running at once     | 4          |
//! | `CACHE_POLICY_FILE`         | JSON policy table replacing the built-in one | unset      |

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backends::MokaStoreConfig;
use crate::policy::PolicyTable;
use crate::refresh::RefreshConfig;

pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_FALLBACK_CAPACITY: &str = "CACHE_FALLBACK_CAPACITY";
pub const ENV_REFRESH_CONCURRENCY: &str = "CACHE_REFRESH_CONCURRENCY";
pub const ENV_POLICY_FILE: &str = "CACHE_POLICY_FILE";

/// Settings used to assemble a [`CacheSystem`](crate::CacheSystem)
#[derive(Clone, Default)]
pub struct CacheConfig {
    /// Primary store URL; `None` runs on the fallback store only
    pub redis_url: Option<String>,
    pub fallback: MokaStoreConfig,
    pub refresh: RefreshConfig,
    /// JSON policy table; `None` uses [`PolicyTable::default`]
    pub policy_file: Option<PathBuf>,
}

impl CacheConfig {
    /// Read configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is set but not a valid number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is set but not a valid number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Self {
            redis_url: non_empty(ENV_REDIS_URL),
            policy_file: non_empty(ENV_POLICY_FILE).map(PathBuf::from),
            ..Self::default()
        };

        if let Some(raw) = non_empty(ENV_FALLBACK_CAPACITY) {
            config.fallback.max_capacity = parse_number(ENV_FALLBACK_CAPACITY, &raw)?;
        }
        if let Some(raw) = non_empty(ENV_REFRESH_CONCURRENCY) {
            config.refresh.max_concurrent = parse_number(ENV_REFRESH_CONCURRENCY, &raw)?;
        }

        Ok(config)
    }

    /// Set the primary store URL
    #[must_use]
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Load the policy table named by `policy_file`, or the built-in table
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a policy table.
    pub fn load_policies(&self) -> Result<PolicyTable> {
        let Some(path) = &self.policy_file else {
            return Ok(PolicyTable::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache policy file {}", path.display()))?;
        PolicyTable::from_json_str(&json)
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // URL may embed credentials
        f.debug_struct("CacheConfig")
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<redacted>"))
            .field("fallback", &self.fallback)
            .field("refresh", &self.refresh)
            .field("policy_file", &self.policy_file)
            .finish()
    }
}

fn parse_number<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("{name} must be a number, got '{raw}'"))
}
