//! In-memory storage backend (no persistence)
//!
//! Functionally complete so lifecycle and dispatcher logic can be tested
//! without touching disk. All data is lost when the process exits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::{Alert, AlertStatus, NewAlert};

use super::backend::AlertStore;
use super::error::StoreResult;
use super::schema::{
    AlertAction, AlertStats, AvailabilityRow, CleanupReport, HealthStatus, MetricSampleRow,
    MetricSummary, ProbeStatus, SampleCleanup, ServiceUptime,
};

#[derive(Default)]
struct Inner {
    alerts: HashMap<i64, Alert>,
    actions: Vec<AlertAction>,
    samples: Vec<MetricSampleRow>,
    availability: Vec<AvailabilityRow>,
    window: HashMap<String, Vec<DateTime<Utc>>>,
    next_id: i64,
}

/// In-memory store behind a single RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, new: &NewAlert, now: DateTime<Utc>) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;

        inner.alerts.insert(
            id,
            Alert {
                id,
                title: new.title.clone(),
                message: new.message.clone(),
                severity: new.severity,
                source: new.source.clone(),
                status: AlertStatus::Open,
                created_at: now,
                acknowledged_at: None,
                acknowledged_by: None,
                resolved_at: None,
                resolved_by: None,
                escalation_level: 0,
                last_escalated_at: None,
                metadata: new.metadata.clone(),
            },
        );

        Ok(id)
    }

    async fn get_alert(&self, id: i64) -> StoreResult<Option<Alert>> {
        Ok(self.inner.read().await.alerts.get(&id).cloned())
    }

    async fn open_alerts(&self, limit: usize) -> StoreResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.status != AlertStatus::Resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        alerts.truncate(limit);
        Ok(alerts)
    }

    async fn escalation_candidates(&self) -> StoreResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.status == AlertStatus::Open)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(alerts)
    }

    async fn acknowledge(&self, id: i64, user: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.alerts.get_mut(&id) {
            Some(alert) if alert.status == AlertStatus::Open => {
                alert.status = AlertStatus::Acknowledged;
                alert.acknowledged_at = Some(now);
                alert.acknowledged_by = Some(user.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn resolve(&self, id: i64, user: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.alerts.get_mut(&id) {
            Some(alert) if alert.status != AlertStatus::Resolved => {
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(now);
                alert.resolved_by = Some(user.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn escalate(&self, id: i64, from_level: u32, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.alerts.get_mut(&id) {
            Some(alert)
                if alert.status == AlertStatus::Open && alert.escalation_level == from_level =>
            {
                alert.escalation_level += 1;
                alert.last_escalated_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_open(&self) -> StoreResult<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .values()
            .filter(|a| a.status == AlertStatus::Open)
            .count())
    }

    async fn has_unresolved(&self, source: &str, title: &str) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.alerts.values().any(|a| {
            a.source == source && a.title == title && a.status != AlertStatus::Resolved
        }))
    }

    async fn append_action(&self, action: &AlertAction) -> StoreResult<()> {
        self.inner.write().await.actions.push(action.clone());
        Ok(())
    }

    async fn actions_for(&self, alert_id: i64) -> StoreResult<Vec<AlertAction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .actions
            .iter()
            .filter(|a| a.alert_id == alert_id)
            .cloned()
            .collect())
    }

    async fn alert_stats(&self, since: DateTime<Utc>) -> StoreResult<AlertStats> {
        let inner = self.inner.read().await;
        let mut stats = AlertStats::default();
        let mut minutes: Vec<f64> = Vec::new();

        for alert in inner.alerts.values().filter(|a| a.created_at >= since) {
            stats.total += 1;
            *stats.by_severity.entry(alert.severity).or_default() += 1;
            *stats
                .by_status
                .entry(alert.status.as_str().to_string())
                .or_default() += 1;
            *stats.by_source.entry(alert.source.clone()).or_default() += 1;

            if let Some(resolved_at) = alert.resolved_at {
                minutes.push((resolved_at - alert.created_at).num_seconds() as f64 / 60.0);
            }
        }

        minutes.sort_by(|a, b| a.total_cmp(b));
        stats.resolution_p50_minutes = percentile(&minutes, 0.50);
        stats.resolution_p90_minutes = percentile(&minutes, 0.90);

        Ok(stats)
    }

    async fn cleanup_alerts(&self, before: DateTime<Utc>) -> StoreResult<CleanupReport> {
        let mut inner = self.inner.write().await;

        let doomed: Vec<i64> = inner
            .alerts
            .values()
            .filter(|a| a.status == AlertStatus::Resolved && a.created_at < before)
            .map(|a| a.id)
            .collect();

        let actions_before = inner.actions.len();
        inner.actions.retain(|a| !doomed.contains(&a.alert_id));
        let actions_deleted = (actions_before - inner.actions.len()) as u64;

        for id in &doomed {
            inner.alerts.remove(id);
        }

        Ok(CleanupReport {
            alerts_deleted: doomed.len() as u64,
            actions_deleted,
        })
    }

    async fn reserve_send(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
        window: Duration,
        max: u32,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let cutoff = now - window;

        let entries = inner.window.entry(fingerprint.to_string()).or_default();
        entries.retain(|ts| *ts >= cutoff);

        if entries.len() < max as usize {
            entries.push(now);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn insert_sample(&self, sample: &MetricSampleRow) -> StoreResult<()> {
        self.inner.write().await.samples.push(sample.clone());
        Ok(())
    }

    async fn insert_availability(&self, sample: &AvailabilityRow) -> StoreResult<()> {
        self.inner.write().await.availability.push(sample.clone());
        Ok(())
    }

    async fn event_count(
        &self,
        category: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .samples
            .iter()
            .filter(|s| {
                s.metric_name.starts_with(category) && s.timestamp >= start && s.timestamp < end
            })
            .count() as u64)
    }

    async fn performance_summary(&self, since: DateTime<Utc>) -> StoreResult<Vec<MetricSummary>> {
        let inner = self.inner.read().await;
        let mut grouped: HashMap<String, (f64, f64, f64, u64, String)> = HashMap::new();

        for sample in inner.samples.iter().filter(|s| s.timestamp >= since) {
            let entry = grouped
                .entry(sample.metric_name.clone())
                .or_insert((0.0, f64::INFINITY, f64::NEG_INFINITY, 0, sample.unit.clone()));
            entry.0 += sample.value;
            entry.1 = entry.1.min(sample.value);
            entry.2 = entry.2.max(sample.value);
            entry.3 += 1;
        }

        let mut summaries: Vec<MetricSummary> = grouped
            .into_iter()
            .map(|(name, (sum, min, max, n, unit))| MetricSummary {
                metric_name: name,
                avg: sum / n as f64,
                min,
                max,
                samples: n,
                unit,
            })
            .collect();
        summaries.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));

        Ok(summaries)
    }

    async fn availability_summary(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<ServiceUptime>> {
        let inner = self.inner.read().await;
        let mut grouped: HashMap<String, (u64, u64, f64, u64)> = HashMap::new();

        for sample in inner.availability.iter().filter(|s| s.timestamp >= since) {
            let entry = grouped
                .entry(sample.service_name.clone())
                .or_insert((0, 0, 0.0, 0));
            entry.0 += 1;
            if sample.status == ProbeStatus::Up {
                entry.1 += 1;
            }
            if let Some(rt) = sample.response_time_ms {
                entry.2 += rt as f64;
                entry.3 += 1;
            }
        }

        let mut uptimes: Vec<ServiceUptime> = grouped
            .into_iter()
            .map(|(name, (total, up, rt_sum, rt_n))| ServiceUptime {
                service_name: name,
                uptime_percentage: up as f64 / total as f64 * 100.0,
                total_checks: total,
                successful_checks: up,
                avg_response_time_ms: (rt_n > 0).then(|| rt_sum / rt_n as f64),
            })
            .collect();
        uptimes.sort_by(|a, b| a.service_name.cmp(&b.service_name));

        Ok(uptimes)
    }

    async fn cleanup_samples(&self, before: DateTime<Utc>) -> StoreResult<SampleCleanup> {
        let mut inner = self.inner.write().await;

        let metrics_before = inner.samples.len();
        inner.samples.retain(|s| s.timestamp >= before);

        let availability_before = inner.availability.len();
        inner.availability.retain(|s| s.timestamp >= before);

        Ok(SampleCleanup {
            metric_samples_deleted: (metrics_before - inner.samples.len()) as u64,
            availability_samples_deleted: (availability_before - inner.availability.len()) as u64,
        })
    }

    async fn health_check(&self) -> StoreResult<HealthStatus> {
        let inner = self.inner.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: format!("in-memory store operational ({} alerts)", inner.alerts.len()),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    Some(sorted[rank - 1])
}
