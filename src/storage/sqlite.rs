//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Concurrency
//!
//! All lifecycle transitions are single `UPDATE ... WHERE status = ?`
//! statements, so two concurrent callers (the API server and the escalation
//! cron) cannot both win the same transition. The rate-limit window uses a
//! transaction for its prune/count/insert sequence.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::{Alert, AlertStatus, Metadata, NewAlert};

use super::backend::AlertStore;
use super::error::{StoreError, StoreResult};
use super::schema::{
    AlertAction, AlertStats, AvailabilityRow, CleanupReport, HealthStatus, MetricSampleRow,
    MetricSummary, ProbeStatus, SampleCleanup, ServiceUptime,
};

/// SQLite storage backend
///
/// Stores alerts, samples, and the notification window in a single local
/// database file shared by the API server and both cron binaries.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Create a new SQLite store
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for safe concurrent access (WAL mode, busy timeout)
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn opt_millis(dt: Option<i64>) -> Option<DateTime<Utc>> {
        dt.map(Self::millis_to_timestamp)
    }

    fn row_to_alert(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Alert> {
        let metadata_str: String = row.get("metadata");
        let metadata: Metadata = serde_json::from_str(&metadata_str)?;

        let status_str: String = row.get("status");
        let status = AlertStatus::parse(&status_str).unwrap_or(AlertStatus::Open);

        Ok(Alert {
            id: row.get("id"),
            title: row.get("title"),
            message: row.get("message"),
            severity: row.get::<i64, _>("severity") as u8,
            source: row.get("source"),
            status,
            created_at: Self::millis_to_timestamp(row.get("created_at")),
            acknowledged_at: Self::opt_millis(row.get("acknowledged_at")),
            acknowledged_by: row.get("acknowledged_by"),
            resolved_at: Self::opt_millis(row.get("resolved_at")),
            resolved_by: row.get("resolved_by"),
            escalation_level: row.get::<i64, _>("escalation_level") as u32,
            last_escalated_at: Self::opt_millis(row.get("last_escalated_at")),
            metadata,
        })
    }
}

const ALERT_COLUMNS: &str = "id, title, message, severity, source, status, created_at, \
     acknowledged_at, acknowledged_by, resolved_at, resolved_by, \
     escalation_level, last_escalated_at, metadata";

#[async_trait]
impl AlertStore for SqliteStore {
    #[instrument(skip(self, new), fields(title = %new.title, severity = new.severity))]
    async fn insert_alert(&self, new: &NewAlert, now: DateTime<Utc>) -> StoreResult<i64> {
        let metadata_json = serde_json::to_string(&new.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (title, message, severity, source, status, created_at, metadata)
            VALUES (?, ?, ?, ?, 'open', ?, ?)
            "#,
        )
        .bind(&new.title)
        .bind(&new.message)
        .bind(new.severity as i64)
        .bind(&new.source)
        .bind(Self::timestamp_to_millis(&now))
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_alert(&self, id: i64) -> StoreResult<Option<Alert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        row.as_ref().map(Self::row_to_alert).transpose()
    }

    async fn open_alerts(&self, limit: usize) -> StoreResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE status IN ('open', 'acknowledged')
             ORDER BY created_at DESC
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_alert).collect()
    }

    async fn escalation_candidates(&self) -> StoreResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE status = 'open'
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_alert).collect()
    }

    #[instrument(skip(self))]
    async fn acknowledge(&self, id: i64, user: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = 'acknowledged', acknowledged_at = ?, acknowledged_by = ?
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(Self::timestamp_to_millis(&now))
        .bind(user)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn resolve(&self, id: i64, user: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = 'resolved', resolved_at = ?, resolved_by = ?
            WHERE id = ? AND status IN ('open', 'acknowledged')
            "#,
        )
        .bind(Self::timestamp_to_millis(&now))
        .bind(user)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn escalate(&self, id: i64, from_level: u32, now: DateTime<Utc>) -> StoreResult<bool> {
        // Gated on status AND level so an acknowledge racing this call can
        // never be overwritten back into escalation.
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET escalation_level = escalation_level + 1, last_escalated_at = ?
            WHERE id = ? AND status = 'open' AND escalation_level = ?
            "#,
        )
        .bind(Self::timestamp_to_millis(&now))
        .bind(id)
        .bind(from_level as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_open(&self) -> StoreResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alerts WHERE status = 'open'")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as usize)
    }

    async fn has_unresolved(&self, source: &str, title: &str) -> StoreResult<bool> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM alerts
            WHERE source = ? AND title = ? AND status IN ('open', 'acknowledged')
            "#,
        )
        .bind(source)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }

    async fn append_action(&self, action: &AlertAction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_actions (alert_id, action, actor, notes, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(action.alert_id)
        .bind(&action.action)
        .bind(&action.actor)
        .bind(&action.notes)
        .bind(Self::timestamp_to_millis(&action.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn actions_for(&self, alert_id: i64) -> StoreResult<Vec<AlertAction>> {
        let rows = sqlx::query(
            r#"
            SELECT alert_id, action, actor, notes, created_at
            FROM alert_actions
            WHERE alert_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AlertAction {
                alert_id: row.get("alert_id"),
                action: row.get("action"),
                actor: row.get("actor"),
                notes: row.get("notes"),
                created_at: Self::millis_to_timestamp(row.get("created_at")),
            })
            .collect())
    }

    #[instrument(skip(self), fields(since = %since))]
    async fn alert_stats(&self, since: DateTime<Utc>) -> StoreResult<AlertStats> {
        let cutoff = Self::timestamp_to_millis(&since);
        let mut stats = AlertStats::default();

        let severity_rows = sqlx::query(
            "SELECT severity, COUNT(*) AS n FROM alerts WHERE created_at >= ? GROUP BY severity",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for row in severity_rows {
            let severity = row.get::<i64, _>("severity") as u8;
            let count = row.get::<i64, _>("n") as u64;
            stats.by_severity.insert(severity, count);
            stats.total += count;
        }

        let status_rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM alerts WHERE created_at >= ? GROUP BY status",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for row in status_rows {
            stats
                .by_status
                .insert(row.get("status"), row.get::<i64, _>("n") as u64);
        }

        let source_rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM alerts WHERE created_at >= ? GROUP BY source",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for row in source_rows {
            stats
                .by_source
                .insert(row.get("source"), row.get::<i64, _>("n") as u64);
        }

        // Resolution-time percentiles, computed over the window's resolved
        // alerts only (bounded by the same cutoff, so never a full scan).
        let resolution_rows = sqlx::query(
            r#"
            SELECT created_at, resolved_at FROM alerts
            WHERE created_at >= ? AND resolved_at IS NOT NULL
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut minutes: Vec<f64> = resolution_rows
            .into_iter()
            .map(|row| {
                let created: i64 = row.get("created_at");
                let resolved: i64 = row.get("resolved_at");
                (resolved - created) as f64 / 60_000.0
            })
            .collect();
        minutes.sort_by(|a, b| a.total_cmp(b));

        stats.resolution_p50_minutes = percentile(&minutes, 0.50);
        stats.resolution_p90_minutes = percentile(&minutes, 0.90);

        Ok(stats)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_alerts(&self, before: DateTime<Utc>) -> StoreResult<CleanupReport> {
        let cutoff = Self::timestamp_to_millis(&before);

        let mut tx = self.pool.begin().await?;

        let actions = sqlx::query(
            r#"
            DELETE FROM alert_actions WHERE alert_id IN (
                SELECT id FROM alerts WHERE status = 'resolved' AND created_at < ?
            )
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let alerts = sqlx::query("DELETE FROM alerts WHERE status = 'resolved' AND created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let report = CleanupReport {
            alerts_deleted: alerts.rows_affected(),
            actions_deleted: actions.rows_affected(),
        };
        info!(
            "alert cleanup removed {} alerts and {} actions",
            report.alerts_deleted, report.actions_deleted
        );

        Ok(report)
    }

    #[instrument(skip(self))]
    async fn reserve_send(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
        window: Duration,
        max: u32,
    ) -> StoreResult<bool> {
        let now_millis = Self::timestamp_to_millis(&now);
        let cutoff = now_millis - window.num_milliseconds();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM notification_window WHERE fingerprint = ? AND sent_at < ?")
            .bind(fingerprint)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notification_window WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_one(&mut *tx)
                .await?;

        let admitted = (row.0 as u32) < max;
        if admitted {
            sqlx::query("INSERT INTO notification_window (fingerprint, sent_at) VALUES (?, ?)")
                .bind(fingerprint)
                .bind(now_millis)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(admitted)
    }

    async fn insert_sample(&self, sample: &MetricSampleRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_samples (metric_name, value, unit, scope, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.metric_name)
        .bind(sample.value)
        .bind(&sample.unit)
        .bind(&sample.scope)
        .bind(Self::timestamp_to_millis(&sample.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_availability(&self, sample: &AvailabilityRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO availability_samples (service_name, status, response_time_ms, error, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.service_name)
        .bind(sample.status.as_str())
        .bind(sample.response_time_ms.map(|v| v as i64))
        .bind(&sample.error)
        .bind(Self::timestamp_to_millis(&sample.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn event_count(
        &self,
        category: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let prefix = format!("{category}%");
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM metric_samples
            WHERE metric_name LIKE ? AND timestamp >= ? AND timestamp < ?
            "#,
        )
        .bind(prefix)
        .bind(Self::timestamp_to_millis(&start))
        .bind(Self::timestamp_to_millis(&end))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 as u64)
    }

    #[instrument(skip(self), fields(since = %since))]
    async fn performance_summary(&self, since: DateTime<Utc>) -> StoreResult<Vec<MetricSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT metric_name, AVG(value) AS avg, MIN(value) AS min, MAX(value) AS max,
                   COUNT(*) AS n, MAX(unit) AS unit
            FROM metric_samples
            WHERE timestamp >= ?
            GROUP BY metric_name
            ORDER BY metric_name
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MetricSummary {
                metric_name: row.get("metric_name"),
                avg: row.get("avg"),
                min: row.get("min"),
                max: row.get("max"),
                samples: row.get::<i64, _>("n") as u64,
                unit: row.get("unit"),
            })
            .collect())
    }

    #[instrument(skip(self), fields(since = %since))]
    async fn availability_summary(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<ServiceUptime>> {
        let rows = sqlx::query(
            r#"
            SELECT service_name,
                   COUNT(*) AS total,
                   SUM(CASE WHEN status = 'up' THEN 1 ELSE 0 END) AS up,
                   AVG(response_time_ms) AS avg_rt
            FROM availability_samples
            WHERE timestamp >= ?
            GROUP BY service_name
            ORDER BY service_name
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let total = row.get::<i64, _>("total") as u64;
                let up = row.get::<i64, _>("up") as u64;
                let uptime = if total == 0 {
                    0.0
                } else {
                    up as f64 / total as f64 * 100.0
                };

                ServiceUptime {
                    service_name: row.get("service_name"),
                    uptime_percentage: uptime,
                    total_checks: total,
                    successful_checks: up,
                    avg_response_time_ms: row.get("avg_rt"),
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_samples(&self, before: DateTime<Utc>) -> StoreResult<SampleCleanup> {
        let cutoff = Self::timestamp_to_millis(&before);

        let metrics = sqlx::query("DELETE FROM metric_samples WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let availability = sqlx::query("DELETE FROM availability_samples WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let report = SampleCleanup {
            metric_samples_deleted: metrics.rows_affected(),
            availability_samples_deleted: availability.rows_affected(),
        };
        info!(
            "sample cleanup removed {} metric and {} availability rows",
            report.metric_samples_deleted, report.availability_samples_deleted
        );

        Ok(report)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StoreResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: format!("SQLite store operational ({})", self.db_path),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                })
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    Some(sorted[rank - 1])
}
