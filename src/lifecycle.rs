//! Alert lifecycle manager and escalation scheduler
//!
//! `AlertEngine` owns every alert mutation: creation, acknowledgement,
//! resolution, escalation, statistics, and retention cleanup. It is the only
//! component that talks to both the store and the dispatcher.
//!
//! ## Escalation state machine
//!
//! ```text
//! While status = open:
//!   level 0 → level 1 → ... → level_max
//! Each transition is gated by the policy's dwell time, measured from
//! last_escalated_at (or created_at for level 0). At level_max the alert
//! stays open until a human acknowledges it: fully escalated, not an error.
//! Acknowledge/resolve freeze the level permanently.
//! ```
//!
//! Transitions race with concurrent API callers; the store's compare-and-set
//! operations decide the winner, and the loser simply treats the alert as
//! already handled.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::notify::{Dispatcher, Notification};
use crate::policy::EscalationPolicy;
use crate::storage::error::StoreError;
use crate::storage::schema::{AlertAction, AlertStats, CleanupReport};
use crate::storage::{AlertStore, StoreResult};
use crate::{Alert, NewAlert, clamp_severity};

/// Hard ceiling on open-alert listings, regardless of the requested limit.
pub const MAX_OPEN_ALERTS: usize = 100;

/// Hard ceiling on the statistics window in days.
pub const MAX_STATS_DAYS: u32 = 90;

/// Title of the alert-volume overload meta-alert. Also the guard that stops
/// the meta-alert from triggering itself.
pub const OVERLOAD_TITLE: &str = "Alert volume overload";

/// Source tag for alerts raised by the engine itself.
pub const SYSTEM_SOURCE: &str = "system";

/// Errors from alert creation.
#[derive(Debug)]
pub enum CreateError {
    /// Missing or out-of-range fields; nothing was written
    Invalid(String),

    Store(StoreError),
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::Invalid(msg) => write!(f, "invalid alert: {}", msg),
            CreateError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CreateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CreateError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CreateError {
    fn from(err: StoreError) -> Self {
        CreateError::Store(err)
    }
}

/// Alert store and lifecycle manager.
pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    dispatcher: Dispatcher,
    policy: EscalationPolicy,
    overload_threshold: usize,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        dispatcher: Dispatcher,
        policy: EscalationPolicy,
        overload_threshold: usize,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy,
            overload_threshold,
        }
    }

    pub fn store(&self) -> &Arc<dyn AlertStore> {
        &self.store
    }

    /// Create a new alert and send its initial notification.
    ///
    /// Severity is clamped into 1-5; empty title or message is rejected with
    /// no state change. A failing notification channel never fails creation.
    pub async fn create_alert(&self, new: NewAlert) -> Result<i64, CreateError> {
        self.create_alert_at(new, Utc::now()).await
    }

    #[instrument(skip(self, new), fields(title = %new.title, source = %new.source))]
    pub async fn create_alert_at(
        &self,
        mut new: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<i64, CreateError> {
        if new.title.trim().is_empty() {
            return Err(CreateError::Invalid("title must not be empty".to_string()));
        }
        if new.message.trim().is_empty() {
            return Err(CreateError::Invalid(
                "message must not be empty".to_string(),
            ));
        }
        new.severity = clamp_severity(new.severity as i64);

        let id = self.store.insert_alert(&new, now).await?;
        info!(
            "created alert #{id} (severity {}, source {})",
            new.severity, new.source
        );

        self.store
            .append_action(&AlertAction::new(id, "created", &new.source, None, now))
            .await?;

        let note = Notification::new(
            &new.title,
            &new.message,
            EscalationPolicy::base_priority(new.severity),
        );
        let report = self.dispatcher.dispatch_at(&note, now).await;
        debug!("initial notification for alert #{id}: {report:?}");

        Ok(id)
    }

    /// Unresolved alerts, most recent first, capped at [`MAX_OPEN_ALERTS`].
    pub async fn get_open_alerts(&self, limit: usize) -> StoreResult<Vec<Alert>> {
        self.store.open_alerts(limit.min(MAX_OPEN_ALERTS)).await
    }

    /// One alert with its action log, or `None`.
    pub async fn get_alert(&self, id: i64) -> StoreResult<Option<(Alert, Vec<AlertAction>)>> {
        let Some(alert) = self.store.get_alert(id).await? else {
            return Ok(None);
        };
        let actions = self.store.actions_for(id).await?;
        Ok(Some((alert, actions)))
    }

    /// Acknowledge an open alert, freezing its escalation level.
    ///
    /// Returns false if the alert does not exist or is already
    /// acknowledged/resolved. That is a no-op signal, not a fault.
    pub async fn acknowledge_alert(
        &self,
        id: i64,
        user: &str,
        notes: Option<String>,
    ) -> StoreResult<bool> {
        self.acknowledge_alert_at(id, user, notes, Utc::now()).await
    }

    #[instrument(skip(self, notes))]
    pub async fn acknowledge_alert_at(
        &self,
        id: i64,
        user: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if !self.store.acknowledge(id, user, now).await? {
            debug!("acknowledge of alert #{id} was a no-op");
            return Ok(false);
        }

        info!("alert #{id} acknowledged by {user}");
        self.store
            .append_action(&AlertAction::new(id, "acknowledged", user, notes, now))
            .await?;

        Ok(true)
    }

    /// Resolve an alert from open or acknowledged.
    pub async fn resolve_alert(
        &self,
        id: i64,
        user: &str,
        notes: Option<String>,
    ) -> StoreResult<bool> {
        self.resolve_alert_at(id, user, notes, Utc::now()).await
    }

    #[instrument(skip(self, notes))]
    pub async fn resolve_alert_at(
        &self,
        id: i64,
        user: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if !self.store.resolve(id, user, now).await? {
            debug!("resolve of alert #{id} was a no-op");
            return Ok(false);
        }

        info!("alert #{id} resolved by {user}");
        self.store
            .append_action(&AlertAction::new(id, "resolved", user, notes, now))
            .await?;

        Ok(true)
    }

    /// Statistics over the trailing window, clamped to [`MAX_STATS_DAYS`].
    pub async fn get_alert_stats(&self, days: u32) -> StoreResult<AlertStats> {
        let days = days.clamp(1, MAX_STATS_DAYS);
        let since = Utc::now() - Duration::days(days as i64);
        self.store.alert_stats(since).await
    }

    /// Delete resolved alerts older than the retention horizon. Open and
    /// acknowledged alerts are never deleted regardless of age.
    pub async fn cleanup_old_alerts(&self, retention_days: u32) -> StoreResult<CleanupReport> {
        let before = Utc::now() - Duration::days(retention_days as i64);
        self.store.cleanup_alerts(before).await
    }

    /// One escalation pass. Returns how many alerts were escalated.
    pub async fn process_escalations(&self) -> StoreResult<usize> {
        self.process_escalations_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn process_escalations_at(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let candidates = self.store.escalation_candidates().await?;
        debug!("escalation pass over {} open alerts", candidates.len());

        let mut escalated = 0;
        for alert in &candidates {
            if self.escalate_one(alert, now).await? {
                escalated += 1;
            }
        }

        if escalated > 0 {
            info!("escalated {escalated} alerts");
        }

        self.check_overload(candidates.len(), now).await;

        Ok(escalated)
    }

    /// Escalate a single alert if its dwell time has elapsed. A lost CAS
    /// (concurrent acknowledge or another scheduler) is a clean skip.
    async fn escalate_one(&self, alert: &Alert, now: DateTime<Utc>) -> StoreResult<bool> {
        let level = alert.escalation_level;

        let Some(dwell) = self.policy.dwell_at(alert.severity, level) else {
            // Fully escalated; stays open until acknowledged
            return Ok(false);
        };

        let basis = alert.last_escalated_at.unwrap_or(alert.created_at);
        if now - basis < dwell {
            return Ok(false);
        }

        if !self.store.escalate(alert.id, level, now).await? {
            debug!("alert #{} changed concurrently, skipping", alert.id);
            return Ok(false);
        }

        let next_level = level + 1;
        info!("alert #{} escalated to level {next_level}", alert.id);

        self.store
            .append_action(&AlertAction::new(
                alert.id,
                "escalated",
                "scheduler",
                Some(format!("level {level} -> {next_level}")),
                now,
            ))
            .await?;

        if let Some(step) = self.policy.step(alert.severity, next_level) {
            let note = Notification::new(
                &alert.title,
                format!(
                    "Escalation level {next_level} for alert #{}: {}",
                    alert.id, alert.message
                ),
                step.priority,
            )
            .channels(step.channels);

            let report = self.dispatcher.dispatch_at(&note, now).await;
            debug!("escalation notification for alert #{}: {report:?}", alert.id);
        }

        Ok(true)
    }

    /// Raise a single system meta-alert when the open-alert volume exceeds
    /// the configured threshold. Suppressed while one is already unresolved,
    /// so the meta-alert can never feed back into itself.
    async fn check_overload(&self, open_count: usize, now: DateTime<Utc>) {
        if open_count <= self.overload_threshold {
            return;
        }

        match self.store.has_unresolved(SYSTEM_SOURCE, OVERLOAD_TITLE).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!("overload guard check failed: {e}");
                return;
            }
        }

        warn!(
            "open alert volume {} exceeds threshold {}",
            open_count, self.overload_threshold
        );

        let meta = NewAlert::new(
            OVERLOAD_TITLE,
            format!(
                "{open_count} alerts are currently open (threshold: {}). \
                 The alerting pipeline may be flooding or a widespread outage is in progress.",
                self.overload_threshold
            ),
        )
        .severity(4)
        .source(SYSTEM_SOURCE);

        // Best effort: a failing meta-alert must not fail the pass
        if let Err(e) = self.create_alert_at(meta, now).await {
            warn!("failed to create overload meta-alert: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::storage::memory::MemoryStore;
    use crate::{AlertStatus, MetadataValue};

    fn test_engine() -> AlertEngine {
        test_engine_with_threshold(20)
    }

    fn test_engine_with_threshold(overload_threshold: usize) -> AlertEngine {
        let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::from_config(&NotifyConfig::default(), store.clone()).unwrap();
        AlertEngine::new(
            store,
            dispatcher,
            EscalationPolicy::default(),
            overload_threshold,
        )
    }

    fn db_down() -> NewAlert {
        NewAlert::new("DB down", "primary database unreachable")
            .severity(5)
            .source("cron")
    }

    #[tokio::test]
    async fn test_create_validates_and_clamps() {
        let engine = test_engine();

        let err = engine
            .create_alert(NewAlert::new("", "message"))
            .await
            .unwrap_err();
        assert!(matches!(err, CreateError::Invalid(_)));

        let err = engine
            .create_alert(NewAlert::new("title", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, CreateError::Invalid(_)));

        let id = engine
            .create_alert(NewAlert::new("title", "message").severity(0))
            .await
            .unwrap();
        let (alert, actions) = engine.get_alert(id).await.unwrap().unwrap();
        assert_eq!(alert.severity, 1);
        assert_eq!(alert.status, AlertStatus::Open);
        assert_eq!(alert.escalation_level, 0);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, "created");
    }

    #[tokio::test]
    async fn test_open_alerts_limit_is_capped() {
        let engine = test_engine();
        // Requesting more than the ceiling must not return more
        for i in 0..3 {
            engine
                .create_alert(NewAlert::new(format!("alert {i}"), "m"))
                .await
                .unwrap();
        }
        let alerts = engine.get_open_alerts(100_000).await.unwrap();
        assert_eq!(alerts.len(), 3);
    }

    #[tokio::test]
    async fn test_escalation_respects_dwell_and_acknowledge_freezes() {
        let engine = test_engine();
        let t0 = Utc::now();

        let id = engine.create_alert_at(db_down(), t0).await.unwrap();

        // Immediately visible with escalation_level = 0
        let alerts = engine.get_open_alerts(10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].escalation_level, 0);

        // Before the dwell elapses nothing happens
        let early = t0 + Duration::minutes(5);
        assert_eq!(engine.process_escalations_at(early).await.unwrap(), 0);

        // After the dwell one pass escalates exactly once
        let due = t0 + Duration::minutes(15);
        assert_eq!(engine.process_escalations_at(due).await.unwrap(), 1);

        let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
        assert_eq!(alert.escalation_level, 1);
        assert_eq!(alert.last_escalated_at, Some(due));

        // Acknowledge freezes the level even after more simulated time
        assert!(
            engine
                .acknowledge_alert_at(id, "ops", None, due)
                .await
                .unwrap()
        );
        let much_later = t0 + Duration::hours(12);
        assert_eq!(engine.process_escalations_at(much_later).await.unwrap(), 0);

        let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
        assert_eq!(alert.escalation_level, 1);
        assert_eq!(alert.status, AlertStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_escalation_stops_at_level_max() {
        let engine = test_engine();
        let t0 = Utc::now();
        let id = engine.create_alert_at(db_down(), t0).await.unwrap();

        // Far more passes than levels
        for hours in 1..=10 {
            let now = t0 + Duration::hours(hours);
            engine.process_escalations_at(now).await.unwrap();
        }

        let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
        assert_eq!(alert.escalation_level, 3);
        // Fully escalated but still open
        assert_eq!(alert.status, AlertStatus::Open);
    }

    #[tokio::test]
    async fn test_acknowledge_is_idempotent_and_preserves_fields() {
        let engine = test_engine();
        let t0 = Utc::now();
        let id = engine.create_alert_at(db_down(), t0).await.unwrap();

        assert!(
            engine
                .acknowledge_alert_at(id, "alice", Some("on it".into()), t0)
                .await
                .unwrap()
        );
        let (before, actions_before) = engine.get_alert(id).await.unwrap().unwrap();

        // Second acknowledge: false, and nothing changed
        assert!(
            !engine
                .acknowledge_alert_at(id, "bob", None, t0 + Duration::minutes(1))
                .await
                .unwrap()
        );
        let (after, actions_after) = engine.get_alert(id).await.unwrap().unwrap();

        assert_eq!(after.acknowledged_by, before.acknowledged_by);
        assert_eq!(after.acknowledged_at, before.acknowledged_at);
        assert_eq!(after.status, before.status);
        assert_eq!(actions_after.len(), actions_before.len());
    }

    #[tokio::test]
    async fn test_resolve_missing_alert_is_noop() {
        let engine = test_engine();
        assert!(!engine.resolve_alert(999, "ops", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_overload_creates_exactly_one_meta_alert() {
        let engine = test_engine_with_threshold(20);
        let t0 = Utc::now();

        for i in 0..25 {
            engine
                .create_alert_at(
                    NewAlert::new(format!("service {i} down"), "probe failed").severity(3),
                    t0,
                )
                .await
                .unwrap();
        }

        engine.process_escalations_at(t0).await.unwrap();
        engine
            .process_escalations_at(t0 + Duration::minutes(1))
            .await
            .unwrap();

        let alerts = engine.get_open_alerts(100).await.unwrap();
        let meta: Vec<_> = alerts
            .iter()
            .filter(|a| a.source == SYSTEM_SOURCE && a.title == OVERLOAD_TITLE)
            .collect();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].severity, 4);
    }

    #[tokio::test]
    async fn test_metadata_survives_roundtrip() {
        let engine = test_engine();
        let id = engine
            .create_alert(
                NewAlert::new("t", "m")
                    .meta("invoice_id", MetadataValue::Integer(42))
                    .meta("client", MetadataValue::String("acme".into())),
            )
            .await
            .unwrap();

        let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
        assert_eq!(
            alert.metadata.get("invoice_id"),
            Some(&MetadataValue::Integer(42))
        );
    }
}
