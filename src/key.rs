//! Cache key construction
//!
//! Keys have the shape `{domain}[:{filters}]:{range}`:
//!
//! - `catalog:all`
//! - `catalog:2024-01-01_2024-01-31`
//! - `catalog:status=paid,view=full:2024-01-01_open`
//!
//! Filters are sorted by name so logically identical requests always produce the
//! same key. Separator characters inside names and values are percent-escaped so two
//! different filter sets can never render to the same string.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Range segment used when no dates are given
const ALL_RANGE: &str = "all";
/// Placeholder for a missing side of a half-open range
const OPEN_BOUND: &str = "open";
/// Filter naming which payload shape a dashboard asked for
const VIEW_FILTER: &str = "view";

/// Payload shape of a dashboard aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    /// Every row plus totals
    Full,
    /// Totals only
    Aggregated,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Full => "full",
            View::Aggregated => "aggregated",
        }
    }
}

/// A request for one domain's aggregation over an optional date range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Domain tag, e.g. `catalog` or `ad-spend`
    pub domain: String,
    /// Inclusive start date
    pub start: Option<NaiveDate>,
    /// Inclusive end date
    pub end: Option<NaiveDate>,
    /// Domain-specific filters (status, attribution, view...)
    pub filters: BTreeMap<String, String>,
}

impl AggregationRequest {
    /// Create a request with no date range and no filters
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            start: None,
            end: None,
            filters: BTreeMap::new(),
        }
    }

    /// Set the date range
    #[must_use]
    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Add a filter; a later value for the same name replaces the earlier one
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Record the payload shape as the `view` filter
    #[must_use]
    pub fn with_view(self, view: View) -> Self {
        self.with_filter(VIEW_FILTER, view.as_str())
    }

    /// Build the cache key for this request
    pub fn cache_key(&self) -> CacheKey {
        let mut key = escape(&self.domain);

        if !self.filters.is_empty() {
            key.push(':');
            let rendered: Vec<String> = self
                .filters
                .iter()
                .map(|(name, value)| format!("{}={}", escape(name), escape(value)))
                .collect();
            key.push_str(&rendered.join(","));
        }

        key.push(':');
        key.push_str(&range_segment(self.start, self.end));
        CacheKey(key)
    }
}

/// Deterministic cache key string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the owned string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn range_segment(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    match (start, end) {
        (None, None) => ALL_RANGE.to_string(),
        (start, end) => format!("{}_{}", bound(start), bound(end)),
    }
}

fn bound(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| OPEN_BOUND.to_string(), |d| d.format("%Y-%m-%d").to_string())
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            ',' => out.push_str("%2C"),
            '=' => out.push_str("%3D"),
            other => out.push(other),
        }
    }
    out
}

/// Parse a date query parameter into a calendar date
///
/// Accepts plain ISO dates (`2024-01-31`) and RFC 3339 timestamps
/// (`2024-01-31T10:00:00Z`); timestamps are truncated to their date in the
/// offset they were written in.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(trimmed).ok().map(|dt| dt.date_naive()))
}
