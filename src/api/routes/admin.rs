//! Administrative endpoints: escalation trigger and retention cleanup

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{CleanupResponse, EscalationResponse},
};

/// Query parameters for DELETE /cleanup
#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    days: Option<u32>,
}

/// POST /escalation
///
/// Runs one escalation pass. Normally triggered by the cron binary; exposed
/// here so the dashboard can force a pass.
pub async fn run_escalation(
    State(state): State<ApiState>,
) -> ApiResult<Json<EscalationResponse>> {
    let escalated_count = state.engine.process_escalations().await?;

    Ok(Json(EscalationResponse {
        escalated_count,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// DELETE /cleanup?days=N
///
/// Deletes resolved alerts older than the retention horizon. Open and
/// acknowledged alerts are never removed.
pub async fn cleanup_alerts(
    State(state): State<ApiState>,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<Json<CleanupResponse>> {
    let days = query.days.unwrap_or(state.default_retention_days).max(1);

    let report = state.engine.cleanup_old_alerts(days).await?;

    Ok(Json(CleanupResponse {
        deleted_alerts: report.alerts_deleted,
        deleted_actions: report.actions_deleted,
        retention_days: days,
    }))
}
