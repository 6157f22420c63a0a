//! Historical metrics aggregator
//!
//! Records time-stamped numeric samples and service-availability probes and
//! computes rolling summaries over caller-bounded windows. The aggregator
//! knows nothing about alerting policy: threshold evaluation happens in the
//! collector cron, which calls the lifecycle engine itself.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, instrument};

use crate::storage::schema::{
    AvailabilityRow, MetricSampleRow, MetricSummary, ProbeStatus, SampleCleanup, ServiceUptime,
};
use crate::storage::{AlertStore, StoreResult};

/// Ceiling on summary windows so no read path can scan unbounded history.
const MAX_WINDOW_HOURS: u32 = 24 * 7;

/// Default lookback for availability summaries (24 hours)
const DEFAULT_AVAILABILITY_HOURS: u32 = 24;

pub struct MetricsAggregator {
    store: Arc<dyn AlertStore>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Append one numeric sample. Fire-and-forget: callers may ignore the
    /// result, the sample is either stored or the error is logged upstream.
    pub async fn record_sample(
        &self,
        metric_name: &str,
        value: f64,
        unit: &str,
        scope: &str,
    ) -> StoreResult<()> {
        self.record_sample_at(metric_name, value, unit, scope, Utc::now())
            .await
    }

    pub async fn record_sample_at(
        &self,
        metric_name: &str,
        value: f64,
        unit: &str,
        scope: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<()> {
        debug!("recording {metric_name}={value}{unit} ({scope})");
        self.store
            .insert_sample(&MetricSampleRow {
                metric_name: metric_name.to_string(),
                value,
                unit: unit.to_string(),
                scope: scope.to_string(),
                timestamp,
            })
            .await
    }

    /// Append one availability probe result.
    pub async fn record_availability(
        &self,
        service_name: &str,
        status: ProbeStatus,
        response_time_ms: Option<u64>,
        error: Option<String>,
    ) -> StoreResult<()> {
        self.record_availability_at(service_name, status, response_time_ms, error, Utc::now())
            .await
    }

    pub async fn record_availability_at(
        &self,
        service_name: &str,
        status: ProbeStatus,
        response_time_ms: Option<u64>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<()> {
        debug!("recording availability {service_name}={status}");
        self.store
            .insert_availability(&AvailabilityRow {
                service_name: service_name.to_string(),
                status,
                response_time_ms,
                error,
                timestamp,
            })
            .await
    }

    /// Number of samples in a category (metric-name prefix) on one day.
    pub async fn event_count(&self, category: &str, date: NaiveDate) -> StoreResult<u64> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let end = start + Duration::days(1);
        self.store.event_count(category, start, end).await
    }

    /// Per-metric avg/min/max over the trailing window.
    #[instrument(skip(self))]
    pub async fn performance_summary(&self, hours: u32) -> StoreResult<Vec<MetricSummary>> {
        let hours = hours.clamp(1, MAX_WINDOW_HOURS);
        let since = Utc::now() - Duration::hours(hours as i64);
        self.store.performance_summary(since).await
    }

    /// Per-service uptime percentages over the trailing 24 hours.
    #[instrument(skip(self))]
    pub async fn availability_metrics(&self) -> StoreResult<Vec<ServiceUptime>> {
        let since = Utc::now() - Duration::hours(DEFAULT_AVAILABILITY_HOURS as i64);
        self.store.availability_summary(since).await
    }

    /// Delete samples older than the retention horizon.
    #[instrument(skip(self))]
    pub async fn cleanup_old_data(&self, retention_days: u32) -> StoreResult<SampleCleanup> {
        let before = Utc::now() - Duration::days(retention_days as i64);
        self.store.cleanup_samples(before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn test_aggregator() -> MetricsAggregator {
        MetricsAggregator::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_record_and_summarize() {
        let aggregator = test_aggregator();

        for value in [30.0, 50.0, 70.0] {
            aggregator
                .record_sample("cpu_used_pct", value, "%", "host")
                .await
                .unwrap();
        }

        let summary = aggregator.performance_summary(24).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].samples, 3);
        assert!((summary[0].avg - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_event_count_is_day_bounded() {
        let aggregator = test_aggregator();
        let today = Utc::now().date_naive();

        aggregator
            .record_sample("cron_run", 1.0, "count", "escalate")
            .await
            .unwrap();
        aggregator
            .record_sample_at(
                "cron_run",
                1.0,
                "count",
                "escalate",
                Utc::now() - Duration::days(2),
            )
            .await
            .unwrap();

        assert_eq!(aggregator.event_count("cron", today).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_availability_metrics_uptime() {
        let aggregator = test_aggregator();

        aggregator
            .record_availability("billing", ProbeStatus::Up, Some(90), None)
            .await
            .unwrap();
        aggregator
            .record_availability(
                "billing",
                ProbeStatus::Down,
                None,
                Some("connection refused".into()),
            )
            .await
            .unwrap();

        let metrics = aggregator.availability_metrics().await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert!((metrics[0].uptime_percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(metrics[0].avg_response_time_ms, Some(90.0));
    }

    #[tokio::test]
    async fn test_cleanup_old_data() {
        let aggregator = test_aggregator();
        let old = Utc::now() - Duration::days(120);

        aggregator
            .record_sample_at("cpu_used_pct", 10.0, "%", "host", old)
            .await
            .unwrap();
        aggregator
            .record_sample("cpu_used_pct", 20.0, "%", "host")
            .await
            .unwrap();

        let report = aggregator.cleanup_old_data(90).await.unwrap();
        assert_eq!(report.metric_samples_deleted, 1);

        let summary = aggregator.performance_summary(24).await.unwrap();
        assert_eq!(summary[0].samples, 1);
    }
}
