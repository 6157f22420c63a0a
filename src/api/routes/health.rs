//! Health check endpoint

use axum::{Json, extract::State};
use chrono::Utc;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::HealthResponse,
};

/// GET /health
///
/// 200 when the store answers, 503 otherwise.
pub async fn health_check(State(state): State<ApiState>) -> ApiResult<Json<HealthResponse>> {
    let health = state.store.health_check().await?;

    if !health.healthy {
        return Err(ApiError::Unavailable(health.message));
    }

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        store: health.message,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
