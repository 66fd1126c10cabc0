//! HTTP surface
//!
//! - `GET    /cache`               - cache statistics
//! - `DELETE /cache?pattern=<p>`   - invalidate keys containing `p`
//! - `POST   /cache/warmup`        - warm this and last month for every registered domain
//! - `GET    /dashboard/{domain}`  - cached aggregation for one domain
//!
//! Every failure body is `{"success": false, "error": "..."}`.

mod handlers;

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

use crate::cache_manager::AggregationCacheManager;
use crate::sources::SourceRegistry;

pub use handlers::request_from_query;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: AggregationCacheManager,
    pub sources: Arc<SourceRegistry>,
}

impl AppState {
    pub fn new(manager: AggregationCacheManager, sources: SourceRegistry) -> Self {
        Self {
            manager,
            sources: Arc::new(sources),
        }
    }
}

/// Build the router for `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/cache",
            get(handlers::cache_stats).delete(handlers::invalidate_cache),
        )
        .route("/cache/warmup", post(handlers::warmup_cache))
        .route("/dashboard/{domain}", get(handlers::dashboard_data))
        .with_state(state)
}
