//! Per-domain TTL and staleness policy
//!
//! One table maps domain tags to their freshness windows. Adding a domain is a
//! data change: the table deserializes from JSON, so operators can ship it as a
//! file (see [`CacheConfig`](crate::CacheConfig)).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default TTL for unknown domains and fast-moving feeds (5 minutes)
pub const DEFAULT_TTL_SECS: u64 = 300;
/// TTL for historical requests (2 hours, stale after 1 hour)
pub const HISTORICAL_TTL_SECS: u64 = 7200;
/// Requests ending more than this many days ago are historical
pub const HISTORICAL_CUTOFF_DAYS: i64 = 30;

/// Freshness policy for one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPolicy {
    /// Seconds before an entry expires
    pub ttl_secs: u64,
    /// Seconds before an entry becomes stale
    pub stale_after_secs: u64,
    /// Whether stale entries may be served while a refresh runs
    pub stale_while_revalidate: bool,
}

impl DomainPolicy {
    /// Policy with no stale window: entries are fresh until they expire
    pub const fn fixed(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            stale_after_secs: ttl_secs,
            stale_while_revalidate: false,
        }
    }

    /// Policy that serves stale data between `stale_after_secs` and `ttl_secs`
    pub const fn revalidating(ttl_secs: u64, stale_after_secs: u64) -> Self {
        Self {
            ttl_secs,
            stale_after_secs,
            stale_while_revalidate: true,
        }
    }

    /// TTL as a `Duration`
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_TTL_SECS)
    }
}

/// Override applied to requests whose end date lies far in the past
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalPolicy {
    /// Requests ending more than this many days before today are historical
    pub cutoff_days: i64,
    /// Policy used for historical requests
    pub policy: DomainPolicy,
}

impl Default for HistoricalPolicy {
    fn default() -> Self {
        Self {
            cutoff_days: HISTORICAL_CUTOFF_DAYS,
            policy: DomainPolicy::revalidating(HISTORICAL_TTL_SECS, HISTORICAL_TTL_SECS / 2),
        }
    }
}

/// Domain → policy table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Policy for domains missing from `domains`
    #[serde(default)]
    pub default: DomainPolicy,
    /// Explicit per-domain policies
    #[serde(default)]
    pub domains: HashMap<String, DomainPolicy>,
    /// Optional historical override; `None` disables it
    #[serde(default)]
    pub historical: Option<HistoricalPolicy>,
}

impl PolicyTable {
    /// Empty table: every domain gets the default policy, no historical override
    pub fn empty() -> Self {
        Self {
            default: DomainPolicy::default(),
            domains: HashMap::new(),
            historical: None,
        }
    }

    /// Parse a table from JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a policy table.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse cache policy table")
    }

    /// Add or replace a domain policy
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>, policy: DomainPolicy) -> Self {
        self.domains.insert(domain.into(), policy);
        self
    }

    /// Set the historical override
    #[must_use]
    pub fn with_historical(mut self, historical: Option<HistoricalPolicy>) -> Self {
        self.historical = historical;
        self
    }

    /// Policy configured for `domain`, ignoring dates
    pub fn for_domain(&self, domain: &str) -> DomainPolicy {
        self.domains.get(domain).copied().unwrap_or(self.default)
    }

    /// Policy for a request on `domain` ending at `end`, evaluated on `today`
    pub fn resolve(&self, domain: &str, end: Option<NaiveDate>, today: NaiveDate) -> DomainPolicy {
        if let (Some(historical), Some(end)) = (self.historical, end) {
            if (today - end).num_days() > historical.cutoff_days {
                return historical.policy;
            }
        }
        self.for_domain(domain)
    }
}

impl Default for PolicyTable {
    /// Built-in dashboard domains
    fn default() -> Self {
        Self::empty()
            .with_domain("catalog", DomainPolicy::fixed(DEFAULT_TTL_SECS))
            .with_domain("crm", DomainPolicy::revalidating(600, 300))
            .with_domain("ad-spend", DomainPolicy::revalidating(600, 300))
            .with_domain("analytics-sessions", DomainPolicy::revalidating(600, 300))
            .with_domain("raw-sheet", DomainPolicy::revalidating(1200, 600))
            .with_domain("year-over-year", DomainPolicy::revalidating(7200, 3600))
            .with_historical(Some(HistoricalPolicy::default()))
    }
}
