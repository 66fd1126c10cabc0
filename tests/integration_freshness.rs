//! Freshness, policy and background refresh tests
//!
//! Time is driven by a manual clock; store TTLs stay far in the future.

mod common;

use chrono::{Duration as ChronoDuration, NaiveDate};
use common::*;
use dashboard_cache::{AggregationRequest, Clock, DashboardError, DataSource};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// catalog: api, then cache, then api again once the 300 s TTL has passed
#[tokio::test]
async fn test_catalog_scenario() {
    let clock = manual_clock();
    let manager = fallback_manager(Arc::clone(&clock));
    let source = CountingSource::new();
    let request = AggregationRequest::new("catalog");

    let first = manager.resolve(&request, source.clone()).await.expect("api");
    assert_eq!(first.source, DataSource::Api);

    let second = manager.resolve(&request, source.clone()).await.expect("cache");
    assert_eq!(second.source, DataSource::Cache);
    assert!(!second.stale);
    assert_eq!(second.data, first.data);

    clock.advance(Duration::from_secs(301));

    let third = manager.resolve(&request, source.clone()).await.expect("api");
    assert_eq!(third.source, DataSource::Api);
    assert_eq!(third.data["version"], 2);
    assert_eq!(source.calls(), 2);
}

/// An entry that is read but too old to serve counts as a miss
#[tokio::test]
async fn test_hit_rate_follows_served_responses() {
    let clock = manual_clock();
    let manager = fallback_manager(Arc::clone(&clock));
    let source = CountingSource::new();
    let request = AggregationRequest::new("catalog");

    manager.resolve(&request, source.clone()).await.expect("api");
    manager.resolve(&request, source.clone()).await.expect("cache");
    clock.advance(Duration::from_secs(301));
    manager.resolve(&request, source.clone()).await.expect("api");

    let stats = manager.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert!((stats.hit_rate - 100.0 / 3.0).abs() < 1e-9);
}

/// A miss calls the source exactly once
#[tokio::test]
async fn test_miss_computes_once() {
    let manager = fallback_manager(manual_clock());
    let source = CountingSource::new();
    let request = AggregationRequest::new("raw-sheet").with_filter("sheet", "orders");

    let response = manager.resolve(&request, source.clone()).await.expect("api");

    assert_eq!(source.calls(), 1);
    assert_eq!(response.data, json!({"domain": "raw-sheet", "version": 1}));
    assert_eq!(manager.refresh_stats().spawned, 0);
}

/// Freshness only moves forward: fresh, then stale, then gone
#[tokio::test]
async fn test_freshness_is_monotonic() {
    let clock = manual_clock();
    let manager = fallback_manager(Arc::clone(&clock));
    let request = AggregationRequest::new("analytics-sessions");
    manager.set_cached_aggregation(&request, &json!({"sessions": 9000})).await;

    let mut seen_stale = false;
    for _ in 0..12 {
        let cached = manager
            .get_cached_aggregation::<serde_json::Value>(&request)
            .await;
        if seen_stale {
            assert!(!cached.is_hit() || cached.stale, "entry became fresh again");
        }
        seen_stale |= cached.stale;
        clock.advance(Duration::from_secs(60));
    }

    assert!(seen_stale);
    assert!(
        !manager
            .get_cached_aggregation::<serde_json::Value>(&request)
            .await
            .is_hit()
    );
}

/// A stale hit returns immediately and the refresh resets `stored_at`
#[tokio::test]
async fn test_stale_hit_does_not_wait_for_refresh() {
    let clock = manual_clock();
    let manager = fallback_manager(Arc::clone(&clock));
    let source = CountingSource::gated();
    let request = AggregationRequest::new("crm");

    manager.set_cached_aggregation(&request, &json!({"version": 0})).await;
    clock.advance(Duration::from_secs(400));

    let response = tokio::time::timeout(
        Duration::from_secs(1),
        manager.resolve(&request, source.clone()),
    )
    .await
    .expect("stale hit must not block on the source")
    .expect("stale hit");

    assert_eq!(response.source, DataSource::Cache);
    assert!(response.stale);
    assert_eq!(response.data, json!({"version": 0}));

    source.release();
    manager.wait_for_refreshes().await;

    let refreshed = manager
        .get_cached_aggregation::<serde_json::Value>(&request)
        .await;
    assert!(!refreshed.stale);
    assert_eq!(refreshed.data, Some(json!({"domain": "crm", "version": 1})));
    assert_eq!(manager.refresh_stats().completed, 1);
}

/// Concurrent stale hits schedule one refresh per key
#[tokio::test]
async fn test_stale_hits_share_one_refresh() {
    let clock = manual_clock();
    let manager = fallback_manager(Arc::clone(&clock));
    let source = CountingSource::gated();
    let request = AggregationRequest::new("ad-spend");

    manager.set_cached_aggregation(&request, &json!({"version": 0})).await;
    clock.advance(Duration::from_secs(450));

    for _ in 0..3 {
        let response = manager.resolve(&request, source.clone()).await.expect("stale");
        assert!(response.stale);
    }

    let stats = manager.refresh_stats();
    assert_eq!(stats.spawned, 1);
    assert_eq!(stats.deduplicated, 2);

    source.release();
    manager.wait_for_refreshes().await;
    assert_eq!(source.calls(), 1);
}

/// A failed refresh is counted and the stale entry keeps being served
#[tokio::test]
async fn test_failed_refresh_keeps_stale_entry() {
    let clock = manual_clock();
    let manager = fallback_manager(Arc::clone(&clock));
    let source = CountingSource::new();
    source.set_failing(true);
    let request = AggregationRequest::new("year-over-year");

    manager.set_cached_aggregation(&request, &json!({"growth": 0.12})).await;
    clock.advance(Duration::from_secs(3700));

    let response = manager.resolve(&request, source.clone()).await.expect("stale");
    assert!(response.stale);

    manager.wait_for_refreshes().await;
    assert_eq!(manager.refresh_stats().failed, 1);

    let again = manager.resolve(&request, source.clone()).await.expect("stale");
    assert_eq!(again.data, json!({"growth": 0.12}));
}

/// Upstream failure on a miss names the domain
#[tokio::test]
async fn test_upstream_failure_on_miss() {
    let manager = fallback_manager(manual_clock());
    let source = CountingSource::new();
    source.set_failing(true);

    let result = manager
        .resolve(&AggregationRequest::new("crm"), source.clone())
        .await;

    match result {
        Err(DashboardError::Upstream { domain, message }) => {
            assert_eq!(domain, "crm");
            assert!(message.contains("unavailable"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert_eq!(manager.stats().await.key_count, 0);
}

/// Ranges ending more than 30 days ago use the long-lived historical policy
#[tokio::test]
async fn test_historical_range_outlives_domain_ttl() {
    let clock = manual_clock();
    let manager = fallback_manager(Arc::clone(&clock));
    let source = CountingSource::new();

    let end = clock.today() - ChronoDuration::days(60);
    let start = NaiveDate::from_ymd_opt(2024, 3, 1);
    let historical = AggregationRequest::new("catalog").with_range(start, Some(end));

    assert_eq!(manager.policy_for(&historical).ttl_secs, 7200);

    manager.resolve(&historical, source.clone()).await.expect("api");
    clock.advance(Duration::from_secs(301));

    let cached = manager.resolve(&historical, source.clone()).await.expect("cache");
    assert_eq!(cached.source, DataSource::Cache);
    assert_eq!(source.calls(), 1);
}
