//! Cache entries and freshness classification
//!
//! An entry carries the time it was stored together with its TTL and staleness
//! window. Freshness is never stored; it is derived at read time:
//!
//! ```text
//! stored_at            stored_at + stale_after        stored_at + ttl
//!     |------- Fresh -------|---------- Stale ------------|--- Expired --->
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Freshness of an entry at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than the staleness window
    Fresh,
    /// Past the staleness window but not yet expired
    Stale,
    /// At or past its TTL; equivalent to absent
    Expired,
}

/// A cached value with its storage metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Cached payload
    pub value: T,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
    /// Seconds until the entry expires
    pub ttl_secs: u64,
    /// Seconds until the entry becomes stale; never greater than `ttl_secs`
    pub stale_after_secs: u64,
}

impl<T> CacheEntry<T> {
    /// Create an entry stored at `stored_at`
    ///
    /// `stale_after_secs` is clamped to `ttl_secs`.
    pub fn new(value: T, stored_at: DateTime<Utc>, ttl_secs: u64, stale_after_secs: u64) -> Self {
        Self {
            value,
            stored_at,
            ttl_secs,
            stale_after_secs: stale_after_secs.min(ttl_secs),
        }
    }

    /// Time-to-live as a `Duration`
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Age of the entry at `now`; zero if `now` precedes `stored_at`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Classify the entry at `now`
    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        let age = self.age(now);
        if age < Duration::from_secs(self.stale_after_secs) {
            Freshness::Fresh
        } else if age < self.ttl() {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Replace the payload, keeping the metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            stored_at: self.stored_at,
            ttl_secs: self.ttl_secs,
            stale_after_secs: self.stale_after_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid time")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_freshness_boundaries() {
        let entry = CacheEntry::new("payload", t0(), 600, 300);

        assert_eq!(entry.freshness(at(0)), Freshness::Fresh);
        assert_eq!(entry.freshness(at(299)), Freshness::Fresh);
        assert_eq!(entry.freshness(at(300)), Freshness::Stale);
        assert_eq!(entry.freshness(at(301)), Freshness::Stale);
        assert_eq!(entry.freshness(at(599)), Freshness::Stale);
        assert_eq!(entry.freshness(at(600)), Freshness::Expired);
        assert_eq!(entry.freshness(at(601)), Freshness::Expired);
    }

    #[test]
    fn test_equal_windows_skip_stale() {
        let entry = CacheEntry::new(1, t0(), 300, 300);

        assert_eq!(entry.freshness(at(299)), Freshness::Fresh);
        assert_eq!(entry.freshness(at(300)), Freshness::Expired);
    }

    #[test]
    fn test_stale_after_clamped_to_ttl() {
        let entry = CacheEntry::new(1, t0(), 60, 120);
        assert_eq!(entry.stale_after_secs, 60);
    }

    #[test]
    fn test_clock_behind_store_is_fresh() {
        let entry = CacheEntry::new(1, t0(), 60, 30);
        assert_eq!(entry.age(at(-10)), Duration::ZERO);
        assert_eq!(entry.freshness(at(-10)), Freshness::Fresh);
    }

    #[test]
    fn test_entry_json_round_trip_keeps_metadata() {
        let entry = CacheEntry::new(serde_json::json!({"revenue": 10}), t0(), 600, 300);
        let json = serde_json::to_value(&entry).expect("encode");
        let parsed: CacheEntry<serde_json::Value> =
            serde_json::from_value(json).expect("decode");
        assert_eq!(parsed, entry);
    }
}
