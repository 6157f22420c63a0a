//! Storage backend trait definition
//!
//! This module defines the core `AlertStore` trait that all storage
//! implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{Alert, NewAlert};

use super::error::StoreResult;
use super::schema::{
    AlertAction, AlertStats, AvailabilityRow, CleanupReport, HealthStatus, MetricSampleRow,
    MetricSummary, SampleCleanup, ServiceUptime,
};

/// Trait for persistent alert/metric storage backends
///
/// All backends must be `Send + Sync`; handles are shared across the API
/// server and the cron binaries via `Arc<dyn AlertStore>`.
///
/// ## Atomicity
///
/// The transition methods (`acknowledge`, `resolve`, `escalate`) are
/// compare-and-set: they only apply when the alert is still in the expected
/// state, and report via their boolean return whether this caller won the
/// transition. A lost race is a no-op, never an error.
#[async_trait]
pub trait AlertStore: Send + Sync {
    // ========================================================================
    // Alert lifecycle
    // ========================================================================

    /// Insert a new open alert at escalation level 0. Returns the new id.
    async fn insert_alert(&self, new: &NewAlert, now: DateTime<Utc>) -> StoreResult<i64>;

    async fn get_alert(&self, id: i64) -> StoreResult<Option<Alert>>;

    /// Unresolved alerts (open or acknowledged), most recent first.
    async fn open_alerts(&self, limit: usize) -> StoreResult<Vec<Alert>>;

    /// Alerts with status = open, oldest first, for the escalation pass.
    async fn escalation_candidates(&self) -> StoreResult<Vec<Alert>>;

    /// CAS open → acknowledged. True if this call performed the transition.
    async fn acknowledge(
        &self,
        id: i64,
        user: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// CAS {open, acknowledged} → resolved.
    async fn resolve(&self, id: i64, user: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// CAS escalation-level increment, gated on status = open and the level
    /// still being `from_level`. Stamps `last_escalated_at`.
    async fn escalate(&self, id: i64, from_level: u32, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Count of alerts with status = open (overload guard input).
    async fn count_open(&self) -> StoreResult<usize>;

    /// Whether an unresolved alert with this source and title already exists.
    async fn has_unresolved(&self, source: &str, title: &str) -> StoreResult<bool>;

    async fn append_action(&self, action: &AlertAction) -> StoreResult<()>;

    async fn actions_for(&self, alert_id: i64) -> StoreResult<Vec<AlertAction>>;

    /// Aggregate statistics for alerts created since the cutoff.
    async fn alert_stats(&self, since: DateTime<Utc>) -> StoreResult<AlertStats>;

    /// Delete resolved alerts (and their action rows) older than the cutoff.
    /// Open and acknowledged alerts are never touched.
    async fn cleanup_alerts(&self, before: DateTime<Utc>) -> StoreResult<CleanupReport>;

    // ========================================================================
    // Notification rate-limit window
    // ========================================================================

    /// Atomically check the sliding window for `fingerprint` and, if fewer
    /// than `max` sends happened within `window`, record one more. Returns
    /// whether the send was admitted. Expired entries are pruned on the way.
    async fn reserve_send(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
        window: Duration,
        max: u32,
    ) -> StoreResult<bool>;

    // ========================================================================
    // Time-series samples
    // ========================================================================

    async fn insert_sample(&self, sample: &MetricSampleRow) -> StoreResult<()>;

    async fn insert_availability(&self, sample: &AvailabilityRow) -> StoreResult<()>;

    /// Number of metric samples in a category (name prefix match) within the
    /// given bounded window.
    async fn event_count(
        &self,
        category: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Per-metric avg/min/max over samples since the cutoff.
    async fn performance_summary(&self, since: DateTime<Utc>) -> StoreResult<Vec<MetricSummary>>;

    /// Per-service uptime percentage over probes since the cutoff.
    async fn availability_summary(&self, since: DateTime<Utc>)
    -> StoreResult<Vec<ServiceUptime>>;

    /// Delete samples older than the cutoff.
    async fn cleanup_samples(&self, before: DateTime<Utc>) -> StoreResult<SampleCleanup>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Lightweight operation verifying the backend is reachable.
    async fn health_check(&self) -> StoreResult<HealthStatus>;

    /// Close the backend and release resources.
    async fn close(&self) -> StoreResult<()>;
}
