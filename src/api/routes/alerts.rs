//! Alert CRUD and lifecycle endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{
        ActionRequest, ActionResponse, AlertResponse, AlertsResponse, CreateAlertRequest,
        CreateResponse,
    },
};
use crate::{NewAlert, clamp_severity};

/// Default page size for alert listings
const DEFAULT_LIMIT: usize = 50;

/// Query parameters for GET /alerts
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    limit: Option<usize>,
}

/// GET /alerts?status=open&limit=N
///
/// Unresolved alerts (open and acknowledged), most recent first.
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<AlertsResponse>> {
    if let Some(status) = &query.status
        && status != "open"
    {
        return Err(ApiError::InvalidRequest(format!(
            "unsupported status filter '{status}' (only 'open' is available)"
        )));
    }

    let alerts = state
        .engine
        .get_open_alerts(query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// GET /alert/{id}
pub async fn get_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertResponse>> {
    let (alert, actions) = state
        .engine
        .get_alert(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("alert {id} not found")))?;

    Ok(Json(AlertResponse { alert, actions }))
}

/// POST /create
pub async fn create_alert(
    State(state): State<ApiState>,
    Json(request): Json<CreateAlertRequest>,
) -> ApiResult<(StatusCode, Json<CreateResponse>)> {
    let title = request
        .title
        .ok_or_else(|| ApiError::InvalidRequest("title is required".to_string()))?;
    let message = request
        .message
        .ok_or_else(|| ApiError::InvalidRequest("message is required".to_string()))?;

    let mut new = NewAlert::new(title, message);
    if let Some(severity) = request.severity {
        new.severity = clamp_severity(severity);
    }
    if let Some(source) = request.source {
        new.source = source;
    }
    if let Some(metadata) = request.metadata {
        new.metadata = metadata;
    }

    let alert_id = state.engine.create_alert(new).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            alert_id,
            message: "alert created".to_string(),
        }),
    ))
}

/// POST /test
///
/// Creates a synthetic alert so operators can verify the whole pipeline.
pub async fn create_test_alert(
    State(state): State<ApiState>,
) -> ApiResult<Json<CreateResponse>> {
    let new = NewAlert::new(
        "Test alert",
        format!("Synthetic test alert created at {}", Utc::now().to_rfc3339()),
    )
    .severity(1)
    .source("test");

    let alert_id = state.engine.create_alert(new).await?;

    Ok(Json(CreateResponse {
        alert_id,
        message: "test alert created".to_string(),
    }))
}

/// PUT /acknowledge/{id}
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    body: Option<Json<ActionRequest>>,
) -> ApiResult<Json<ActionResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let user = request.user.unwrap_or_else(|| "api".to_string());

    let transitioned = state
        .engine
        .acknowledge_alert(id, &user, request.notes)
        .await?;

    if !transitioned {
        return Err(ApiError::NotFound(format!(
            "alert {id} not found or already acknowledged"
        )));
    }

    Ok(Json(ActionResponse {
        alert_id: id,
        status: "acknowledged".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// PUT /resolve/{id}
pub async fn resolve_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    body: Option<Json<ActionRequest>>,
) -> ApiResult<Json<ActionResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let user = request.user.unwrap_or_else(|| "api".to_string());

    let transitioned = state.engine.resolve_alert(id, &user, request.notes).await?;

    if !transitioned {
        return Err(ApiError::NotFound(format!(
            "alert {id} not found or already resolved"
        )));
    }

    Ok(Json(ActionResponse {
        alert_id: id,
        status: "resolved".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
