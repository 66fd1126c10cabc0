//! Dashboard Server Example
//!
//! Serves the cache routes over a few simulated upstream sources.
//!
//! Run with: cargo run --example dashboard_server
//!
//! ```text
//! curl localhost:3000/dashboard/catalog?startDate=2024-06-01&endDate=2024-06-30
//! curl localhost:3000/cache
//! curl -X POST localhost:3000/cache/warmup
//! curl -X DELETE 'localhost:3000/cache?pattern=catalog'
//! ```
//!
//! Set `REDIS_URL` to use Redis as the primary store; leave it unset to run on the
//! in-process store only.

use dashboard_cache::http::{AppState, router};
use dashboard_cache::{AggregationRequest, AggregationSource, CacheSystem, FnSource, SourceRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stand-in for a slow spreadsheet or API aggregation
fn simulated_source(domain: &'static str, latency: Duration) -> Arc<dyn AggregationSource> {
    Arc::new(FnSource::new(move |request: AggregationRequest| async move {
        tokio::time::sleep(latency).await;
        Ok(json!({
            "domain": domain,
            "start": request.start,
            "end": request.end,
            "filters": request.filters,
            "rows": rand::random::<u16>(),
        }))
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,dashboard_cache=debug")),
        )
        .init();

    let cache = CacheSystem::from_env().await?;

    let sources = SourceRegistry::new()
        .with_source("catalog", simulated_source("catalog", Duration::from_millis(800)))
        .with_source("crm", simulated_source("crm", Duration::from_millis(1200)))
        .with_source("ad-spend", simulated_source("ad-spend", Duration::from_millis(600)))
        .with_source("analytics-sessions", simulated_source("analytics-sessions", Duration::from_millis(900)));

    let app = router(AppState::new(cache.manager().clone(), sources));

    let addr = std::env::var("DASHBOARD_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Dashboard server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    cache.shutdown().await;
    Ok(())
}
