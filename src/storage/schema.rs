//! Row and report types shared by all storage backends

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit entry appended on every alert mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAction {
    pub alert_id: i64,
    pub action: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AlertAction {
    pub fn new(
        alert_id: i64,
        action: impl Into<String>,
        actor: impl Into<String>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id,
            action: action.into(),
            actor: actor.into(),
            notes,
            created_at,
        }
    }
}

/// One time-stamped numeric sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSampleRow {
    pub metric_name: String,
    pub value: f64,
    pub unit: String,

    /// What the sample refers to (hostname, mount point, service name)
    pub scope: String,

    pub timestamp: DateTime<Utc>,
}

/// Result of a service availability probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRow {
    pub service_name: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Up => "up",
            ProbeStatus::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(ProbeStatus::Up),
            "down" => Some(ProbeStatus::Down),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated alert statistics over a bounded window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: u64,
    pub by_severity: BTreeMap<u8, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,

    /// Median time from creation to resolution, for resolved alerts in window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_p50_minutes: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_p90_minutes: Option<f64>,
}

/// Rolling summary for one metric over a bounded window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric_name: String,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub samples: u64,
    pub unit: String,
}

/// Per-service uptime over a bounded window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUptime {
    pub service_name: String,
    pub uptime_percentage: f64,
    pub total_checks: u64,
    pub successful_checks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_time_ms: Option<f64>,
}

/// What alert retention cleanup removed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub alerts_deleted: u64,
    pub actions_deleted: u64,
}

/// What sample retention cleanup removed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SampleCleanup {
    pub metric_samples_deleted: u64,
    pub availability_samples_deleted: u64,
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,
}
