pub mod aggregator;
pub mod api;
pub mod config;
pub mod lifecycle;
pub mod lock;
pub mod notify;
pub mod policy;
pub mod storage;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an alert.
///
/// The only reachable edges are open → acknowledged → resolved and
/// open → resolved. Transitions happen exclusively through the store's
/// compare-and-set operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// Get the string representation (lowercase)
    ///
    /// This matches the serde serialization format and the database column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(AlertStatus::Open),
            "acknowledged" => Some(AlertStatus::Acknowledged),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar metadata attached to an alert.
///
/// A closed set of variants instead of arbitrary JSON so the engine never
/// has to interpret nested structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A stateful record of a detected condition requiring human attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub title: String,
    pub message: String,

    /// Urgency 1-5, 5 = most urgent.
    pub severity: u8,

    /// Free-form origin tag ("payments", "cron", "system", ...).
    pub source: String,

    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,

    /// Non-decreasing while status = open, frozen afterwards.
    pub escalation_level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_escalated_at: Option<DateTime<Utc>>,

    pub metadata: Metadata,
}

/// Input for creating a new alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub title: String,
    pub message: String,
    pub severity: u8,
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewAlert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity: 3,
            source: "manual".to_string(),
            metadata: Metadata::new(),
        }
    }

    pub fn severity(mut self, severity: u8) -> Self {
        self.severity = severity;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Clamp a requested severity into the valid 1-5 range.
pub fn clamp_severity(severity: i64) -> u8 {
    severity.clamp(1, 5) as u8
}
