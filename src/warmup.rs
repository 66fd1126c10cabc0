//! Cache warmup
//!
//! Pre-populates the cache for the ranges dashboards open most often, so the
//! first visitor after a deploy or an invalidation does not pay for a cold miss.
//! Each target × range pair is computed straight from its source and stored,
//! whatever is currently cached. Targets carry the same `view` filter the
//! dashboard route adds, so warmed entries are the ones dashboards read.

use chrono::{Datelike, Months, NaiveDate};
use futures_util::future::join_all;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use crate::cache_manager::AggregationCacheManager;
use crate::key::{AggregationRequest, View};
use crate::sources::SourceRegistry;

/// A labelled date range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRange {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl NamedRange {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// First to last day of the month containing `today`
    pub fn this_month(today: NaiveDate) -> Option<Self> {
        let (start, end) = month_bounds(today)?;
        Some(Self::new("this_month", start, end))
    }

    /// First to last day of the month before the one containing `today`
    pub fn last_month(today: NaiveDate) -> Option<Self> {
        let previous = today.checked_sub_months(Months::new(1))?;
        let (start, end) = month_bounds(previous)?;
        Some(Self::new("last_month", start, end))
    }
}

fn month_bounds(day: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = day.with_day(1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((start, end))
}

/// One request shape to warm, with the label used in the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupTarget {
    /// Report label, e.g. `gads_agg` for the aggregated `ad-spend` view
    pub label: String,
    /// Request whose domain and filters are warmed; its range is replaced
    pub template: AggregationRequest,
}

impl WarmupTarget {
    /// Warm the full view of `domain`, labelled by the domain name
    pub fn domain(domain: impl Into<String>) -> Self {
        let template = AggregationRequest::new(domain).with_view(View::Full);
        Self {
            label: template.domain.clone(),
            template,
        }
    }

    /// Warm the aggregated view of `domain`, labelled `{domain}_agg`
    pub fn aggregated(domain: impl Into<String>) -> Self {
        let template = AggregationRequest::new(domain).with_view(View::Aggregated);
        Self {
            label: format!("{}_agg", template.domain),
            template,
        }
    }

    /// Warm `template` under a custom label
    pub fn labelled(label: impl Into<String>, template: AggregationRequest) -> Self {
        Self {
            label: label.into(),
            template,
        }
    }
}

/// Which domains and ranges to warm
#[derive(Debug, Clone, Default)]
pub struct WarmupPlan {
    pub ranges: Vec<NamedRange>,
    pub targets: Vec<WarmupTarget>,
}

impl WarmupPlan {
    /// `this_month` and `last_month` relative to `today`, both views of each domain
    pub fn for_domains<I, S>(domains: I, today: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets = domains
            .into_iter()
            .flat_map(|domain| {
                let domain = domain.into();
                [WarmupTarget::domain(domain.clone()), WarmupTarget::aggregated(domain)]
            })
            .collect();

        Self {
            ranges: default_ranges(today),
            targets,
        }
    }

    /// Default ranges for every domain in `sources`
    pub fn for_registry(sources: &SourceRegistry, today: NaiveDate) -> Self {
        Self::for_domains(sources.domains(), today)
    }

    #[must_use]
    pub fn with_range(mut self, range: NamedRange) -> Self {
        self.ranges.push(range);
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: WarmupTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Number of target × range pairs
    pub fn len(&self) -> usize {
        self.ranges.len() * self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute and store every pair
    ///
    /// Pairs run concurrently; one failing pair does not affect the others.
    pub async fn run(&self, manager: &AggregationCacheManager, sources: &SourceRegistry) -> WarmupReport {
        let started = Instant::now();
        info!(endpoints = self.len(), "Starting cache warmup");

        let jobs = self.ranges.iter().flat_map(|range| {
            self.targets
                .iter()
                .map(move |target| warm_one(manager, sources, target, range))
        });
        let results = join_all(jobs).await;

        let success_count = results.iter().filter(|r| r.is_success()).count();
        let total_time_ms = elapsed_ms(started);

        info!(
            total_time_ms = total_time_ms,
            success_count = success_count,
            total_endpoints = results.len(),
            "Cache warmup completed"
        );

        WarmupReport {
            total_time_ms,
            success_count,
            total_endpoints: results.len(),
            results,
        }
    }
}

fn default_ranges(today: NaiveDate) -> Vec<NamedRange> {
    [NamedRange::this_month(today), NamedRange::last_month(today)]
        .into_iter()
        .flatten()
        .collect()
}

async fn warm_one(
    manager: &AggregationCacheManager,
    sources: &SourceRegistry,
    target: &WarmupTarget,
    range: &NamedRange,
) -> WarmupResult {
    let endpoint = format!("{}_{}", target.label, range.name);
    let started = Instant::now();

    let Some(source) = sources.get(&target.template.domain) else {
        warn!(endpoint = %endpoint, domain = %target.template.domain, "No source registered, skipping warmup");
        return WarmupResult::failed(endpoint, format!("no source registered for domain '{}'", target.template.domain), 0);
    };

    let request = target
        .template
        .clone()
        .with_range(Some(range.start), Some(range.end));

    match source.fetch(&request).await {
        Ok(data) => {
            manager.set_cached_aggregation(&request, &data).await;
            WarmupResult {
                endpoint,
                status: WarmupResult::SUCCESS.to_string(),
                time_ms: elapsed_ms(started),
            }
        }
        Err(e) => {
            warn!(endpoint = %endpoint, domain = %request.domain, error = %e, "Warmup fetch failed");
            WarmupResult::failed(endpoint, e.to_string(), elapsed_ms(started))
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Outcome of one target × range pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupResult {
    /// `{label}_{range}`
    pub endpoint: String,
    /// `success` or `error: {message}`
    pub status: String,
    pub time_ms: u64,
}

impl WarmupResult {
    const SUCCESS: &'static str = "success";

    fn failed(endpoint: String, message: String, time_ms: u64) -> Self {
        Self {
            endpoint,
            status: format!("error: {message}"),
            time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }
}

/// Summary of a warmup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupReport {
    pub total_time_ms: u64,
    pub success_count: usize,
    pub total_endpoints: usize,
    pub results: Vec<WarmupResult>,
}
