//! HTTP route tests driven through `tower::ServiceExt::oneshot`

#![cfg(feature = "http")]

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::*;
use dashboard_cache::http::{AppState, router};
use dashboard_cache::{AggregationSource, SourceRegistry};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(sources: SourceRegistry) -> Router {
    router(AppState::new(fallback_manager(manual_clock()), sources))
}

fn app() -> (Router, Arc<CountingSource>) {
    let catalog = CountingSource::new();
    let sources = SourceRegistry::new()
        .with_source("catalog", catalog.clone() as Arc<dyn AggregationSource>);
    (app_with(sources), catalog)
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("valid request");

    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

#[tokio::test]
async fn test_stats_endpoint() {
    let (app, _) = app();

    let (status, body) = send(&app, Method::GET, "/cache").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["stats"]["backend"], "fallback");
    assert_eq!(body["stats"]["keyCount"], 0);
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_dashboard_api_then_cache() {
    let (app, catalog) = app();

    let (status, first) = send(&app, Method::GET, "/dashboard/catalog?startDate=2024-06-01&endDate=2024-06-30").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["source"], "api");
    assert_eq!(first["stale"], false);
    assert_eq!(first["data"]["domain"], "catalog");

    let (_, second) = send(&app, Method::GET, "/dashboard/catalog?endDate=2024-06-30&startDate=2024-06-01").await;
    assert_eq!(second["source"], "cache");
    assert_eq!(catalog.calls(), 1);

    // A different view is a different entry
    let (_, aggregated) = send(
        &app,
        Method::GET,
        "/dashboard/catalog?startDate=2024-06-01&endDate=2024-06-30&aggregated=true",
    )
    .await;
    assert_eq!(aggregated["source"], "api");
    assert_eq!(catalog.calls(), 2);
}

#[tokio::test]
async fn test_dashboard_errors() {
    let (app, _) = app();

    let (status, body) = send(&app, Method::GET, "/dashboard/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, body) = send(&app, Method::GET, "/dashboard/catalog?startDate=someday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("startDate")));
}

#[tokio::test]
async fn test_upstream_failure_is_500() {
    let failing = CountingSource::new();
    failing.set_failing(true);
    let app = app_with(
        SourceRegistry::new().with_source("crm", failing as Arc<dyn AggregationSource>),
    );

    let (status, body) = send(&app, Method::GET, "/dashboard/crm").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("crm")));
}

#[tokio::test]
async fn test_invalidate_endpoint() {
    let (app, _) = app();
    send(&app, Method::GET, "/dashboard/catalog").await;

    let (status, body) = send(&app, Method::DELETE, "/cache").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("Pattern parameter required")));

    let (status, body) = send(&app, Method::DELETE, "/cache?pattern=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(&app, Method::DELETE, "/cache?pattern=catalog").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidatedCount"], 1);
    assert_eq!(body["message"], "Invalidated 1 cache entries matching \"catalog\"");

    let (_, body) = send(&app, Method::GET, "/cache").await;
    assert_eq!(body["stats"]["keyCount"], 0);
}

#[tokio::test]
async fn test_warmup_endpoint() {
    let failing = CountingSource::new();
    failing.set_failing(true);
    let sources = SourceRegistry::new()
        .with_source("catalog", CountingSource::new() as Arc<dyn AggregationSource>)
        .with_source("crm", failing as Arc<dyn AggregationSource>);
    let app = app_with(sources);

    let (status, body) = send(&app, Method::POST, "/cache/warmup").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["totalEndpoints"], 8);
    assert_eq!(body["successCount"], 4);

    let results = body["results"].as_array().expect("results array");
    let endpoints: Vec<&str> = results
        .iter()
        .filter_map(|r| r["endpoint"].as_str())
        .collect();
    assert!(endpoints.contains(&"catalog_this_month"));
    assert!(endpoints.contains(&"catalog_agg_last_month"));
    assert!(endpoints.contains(&"crm_last_month"));
    assert!(
        results
            .iter()
            .filter(|r| r["endpoint"].as_str().is_some_and(|e| e.starts_with("crm")))
            .all(|r| r["status"].as_str().is_some_and(|s| s.starts_with("error: ")))
    );

    let (_, stats) = send(&app, Method::GET, "/cache").await;
    assert_eq!(stats["stats"]["keyCount"], 4);
}

#[tokio::test]
async fn test_warmed_entries_serve_dashboard_requests() {
    let (app, catalog) = app();

    let (_, report) = send(&app, Method::POST, "/cache/warmup").await;
    assert_eq!(report["successCount"], 4);
    assert_eq!(catalog.calls(), 4);

    // The clock sits in June 2024, so these are this month and last month
    for uri in [
        "/dashboard/catalog?startDate=2024-06-01&endDate=2024-06-30",
        "/dashboard/catalog?startDate=2024-06-01&endDate=2024-06-30&aggregated=true",
        "/dashboard/catalog?startDate=2024-05-01&endDate=2024-05-31",
        "/dashboard/catalog?startDate=2024-05-01&endDate=2024-05-31&aggregated=true",
    ] {
        let (status, body) = send(&app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "cache", "{uri} was not served from the warmed entry");
    }
    assert_eq!(catalog.calls(), 4);
}
