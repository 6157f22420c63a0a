//! Shared API request/response types
//!
//! Proper typed responses instead of `Json<Value>` so the dashboard and the
//! hooks deserialize against a stable shape.

use serde::{Deserialize, Serialize};

use crate::storage::schema::{AlertAction, AlertStats, ServiceUptime};
use crate::{Alert, Metadata};

/// Request body for POST /create
///
/// Title and message are optional at the serde layer so their absence maps
/// to a 400 with a useful message instead of a body-rejection error.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlertRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub severity: Option<i64>,
    pub source: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Request body for PUT /acknowledge/{id} and PUT /resolve/{id}
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    pub user: Option<String>,
    pub notes: Option<String>,
}

/// Response for GET /alerts
#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub count: usize,
    pub timestamp: String,
}

/// Response for GET /alert/{id}
#[derive(Debug, Clone, Serialize)]
pub struct AlertResponse {
    pub alert: Alert,
    pub actions: Vec<AlertAction>,
}

/// Response for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub stats: AlertStats,
    pub availability: Vec<ServiceUptime>,
    pub period_days: u32,
    pub timestamp: String,
}

/// Response for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub timestamp: String,
}

/// Response for POST /create and POST /test
#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub alert_id: i64,
    pub message: String,
}

/// Response for PUT /acknowledge/{id} and PUT /resolve/{id}
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub alert_id: i64,
    pub status: String,
    pub timestamp: String,
}

/// Response for POST /escalation
#[derive(Debug, Clone, Serialize)]
pub struct EscalationResponse {
    pub escalated_count: usize,
    pub timestamp: String,
}

/// Response for DELETE /cleanup
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub deleted_alerts: u64,
    pub deleted_actions: u64,
    pub retention_days: u32,
}
