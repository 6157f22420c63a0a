//! Statistics endpoint

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::{error::ApiResult, state::ApiState, types::StatsResponse};
use crate::lifecycle::MAX_STATS_DAYS;

/// Default statistics window in days
const DEFAULT_DAYS: u32 = 7;

/// Query parameters for GET /stats
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    days: Option<u32>,
}

/// GET /stats?days=N
///
/// Alert statistics plus service availability. The window is clamped so an
/// oversized `days` never turns into a full-history scan.
pub async fn get_stats(
    State(state): State<ApiState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let days = query.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_STATS_DAYS);

    let stats = state.engine.get_alert_stats(days).await?;
    let availability = state.aggregator.availability_metrics().await?;

    Ok(Json(StatsResponse {
        stats,
        availability,
        period_days: days,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
