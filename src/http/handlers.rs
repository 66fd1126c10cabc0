use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use super::AppState;
use crate::cache_manager::DataSource;
use crate::error::DashboardError;
use crate::facade::CacheStats;
use crate::key::{AggregationRequest, View, parse_date};
use crate::warmup::{WarmupPlan, WarmupReport};

const START_DATE: &str = "startDate";
const END_DATE: &str = "endDate";
const AGGREGATED: &str = "aggregated";

#[derive(Debug, Serialize)]
pub(super) struct StatsResponse {
    success: bool,
    stats: CacheStats,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct InvalidateParams {
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InvalidateResponse {
    success: bool,
    message: String,
    invalidated_count: usize,
}

#[derive(Debug, Serialize)]
pub(super) struct WarmupResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    report: WarmupReport,
}

#[derive(Debug, Serialize)]
pub(super) struct DashboardResponse {
    success: bool,
    data: serde_json::Value,
    source: DataSource,
    stale: bool,
}

/// GET /cache
pub(super) async fn cache_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.manager.stats().await;
    Json(StatsResponse {
        success: true,
        stats,
        timestamp: state.manager.clock().now().to_rfc3339(),
    })
}

/// DELETE /cache?pattern=<p>
pub(super) async fn invalidate_cache(
    State(state): State<AppState>,
    Query(params): Query<InvalidateParams>,
) -> Result<Json<InvalidateResponse>, DashboardError> {
    let pattern = params
        .pattern
        .filter(|p| !p.is_empty())
        .ok_or_else(|| DashboardError::InvalidRequest("Pattern parameter required".to_string()))?;

    let count = state.manager.invalidate(&pattern).await;

    Ok(Json(InvalidateResponse {
        success: true,
        message: format!("Invalidated {count} cache entries matching \"{pattern}\""),
        invalidated_count: count,
    }))
}

/// POST /cache/warmup
pub(super) async fn warmup_cache(State(state): State<AppState>) -> Json<WarmupResponse> {
    let plan = WarmupPlan::for_registry(&state.sources, state.manager.clock().today());
    let report = plan.run(&state.manager, &state.sources).await;

    Json(WarmupResponse {
        success: true,
        message: "Cache warm-up completed".to_string(),
        report,
    })
}

/// GET /dashboard/{domain}
pub(super) async fn dashboard_data(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<DashboardResponse>, DashboardError> {
    let source = state
        .sources
        .get(&domain)
        .ok_or_else(|| DashboardError::UnknownDomain(domain.clone()))?;

    let request = request_from_query(&domain, &query)?;
    let response = state.manager.resolve(&request, source).await?;

    info!(
        domain = %domain,
        source = ?response.source,
        stale = response.stale,
        "Served dashboard data"
    );

    Ok(Json(DashboardResponse {
        success: true,
        data: response.data,
        source: response.source,
        stale: response.stale,
    }))
}

/// Build an [`AggregationRequest`] from dashboard query parameters
///
/// `startDate` and `endDate` accept ISO dates or RFC 3339 timestamps.
/// `aggregated=true` becomes the filter `view=aggregated`, anything else
/// `view=full`. Every other parameter is kept as a filter.
///
/// # Errors
///
/// Returns [`DashboardError::InvalidRequest`] if a date does not parse.
pub fn request_from_query(
    domain: &str,
    query: &HashMap<String, String>,
) -> Result<AggregationRequest, DashboardError> {
    let date = |name: &str| -> Result<_, DashboardError> {
        match query.get(name).map(|raw| raw.trim()).filter(|raw| !raw.is_empty()) {
            None => Ok(None),
            Some(raw) => parse_date(raw)
                .map(Some)
                .ok_or_else(|| DashboardError::InvalidRequest(format!("{name} '{raw}' is not a date"))),
        }
    };

    let view = if query.get(AGGREGATED).is_some_and(|v| v == "true") {
        View::Aggregated
    } else {
        View::Full
    };

    let mut request = AggregationRequest::new(domain)
        .with_range(date(START_DATE)?, date(END_DATE)?)
        .with_view(view);

    for (name, value) in query {
        if matches!(name.as_str(), START_DATE | END_DATE | AGGREGATED) || value.is_empty() {
            continue;
        }
        request = request.with_filter(name.as_str(), value.as_str());
    }

    Ok(request)
}
