//! End-to-end escalation lifecycle scenarios
//!
//! These cover the engine's observable guarantees:
//! - status only moves open → acknowledged → resolved (or open → resolved)
//! - escalation level is non-decreasing, bounded, and frozen by acknowledge
//! - retention cleanup never touches unresolved alerts
//! - alert-volume overload produces exactly one meta-alert

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use vigil::lifecycle::{OVERLOAD_TITLE, SYSTEM_SOURCE};
use vigil::{AlertStatus, NewAlert};

use crate::helpers::{create_test_engine, create_test_engine_with_threshold, sample_alert};

#[tokio::test]
async fn test_full_lifecycle_db_down_scenario() {
    let (_store, engine) = create_test_engine();
    let t0 = Utc::now();

    // Create a severity-5 alert
    let id = engine
        .create_alert_at(
            NewAlert::new("DB down", "primary database unreachable").severity(5),
            t0,
        )
        .await
        .unwrap();

    // Immediately visible via the open listing with escalation_level = 0
    let alerts = engine.get_open_alerts(10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, id);
    assert_eq!(alerts[0].escalation_level, 0);
    assert_eq!(alerts[0].status, AlertStatus::Open);

    // After the dwell elapses, one scheduler pass increments to level 1
    let due = t0 + Duration::minutes(16);
    let escalated = engine.process_escalations_at(due).await.unwrap();
    assert_eq!(escalated, 1);

    let (alert, actions) = engine.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.escalation_level, 1);
    assert!(actions.iter().any(|a| a.action == "escalated"));

    // Acknowledging stops escalation even after further simulated time
    assert!(
        engine
            .acknowledge_alert_at(id, "ops", Some("investigating".into()), due)
            .await
            .unwrap()
    );

    for hours in 1..=6 {
        let now = due + Duration::hours(hours);
        assert_eq!(engine.process_escalations_at(now).await.unwrap(), 0);
    }

    let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.escalation_level, 1);
    assert_eq!(alert.status, AlertStatus::Acknowledged);

    // Resolve closes it out
    assert!(engine.resolve_alert(id, "ops", None).await.unwrap());
    let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert!(alert.resolved_at.is_some());
}

#[tokio::test]
async fn test_escalation_level_is_monotone_and_bounded() {
    let (_store, engine) = create_test_engine();
    let t0 = Utc::now();

    let id = engine
        .create_alert_at(sample_alert("stuck queue", 4), t0)
        .await
        .unwrap();

    let mut previous_level = 0;
    for minutes in (0..=600).step_by(10) {
        let now = t0 + Duration::minutes(minutes);
        engine.process_escalations_at(now).await.unwrap();

        let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
        assert!(alert.escalation_level >= previous_level, "level decreased");
        assert!(alert.escalation_level <= 3, "level exceeded level_max");
        previous_level = alert.escalation_level;
    }

    // Fully escalated alerts stay open until a human steps in
    let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.escalation_level, 3);
    assert_eq!(alert.status, AlertStatus::Open);
}

#[tokio::test]
async fn test_no_edge_from_resolved() {
    let (_store, engine) = create_test_engine();
    let t0 = Utc::now();

    let id = engine
        .create_alert_at(sample_alert("one-off", 2), t0)
        .await
        .unwrap();
    assert!(engine.resolve_alert_at(id, "ops", None, t0).await.unwrap());

    // No way back: acknowledge and resolve are no-ops, escalation skips it
    assert!(!engine.acknowledge_alert_at(id, "ops", None, t0).await.unwrap());
    assert!(!engine.resolve_alert_at(id, "ops", None, t0).await.unwrap());
    assert_eq!(
        engine
            .process_escalations_at(t0 + Duration::hours(2))
            .await
            .unwrap(),
        0
    );

    let (alert, _) = engine.get_alert(id).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert_eq!(alert.escalation_level, 0);
}

#[tokio::test]
async fn test_cleanup_spares_unresolved_alerts_of_any_age() {
    let (_store, engine) = create_test_engine();
    let ancient = Utc::now() - Duration::days(365);

    let open_id = engine
        .create_alert_at(sample_alert("ancient open", 3), ancient)
        .await
        .unwrap();
    let acked_id = engine
        .create_alert_at(sample_alert("ancient acked", 3), ancient)
        .await
        .unwrap();
    engine
        .acknowledge_alert_at(acked_id, "ops", None, ancient)
        .await
        .unwrap();
    let resolved_id = engine
        .create_alert_at(sample_alert("ancient resolved", 3), ancient)
        .await
        .unwrap();
    engine
        .resolve_alert_at(resolved_id, "ops", None, ancient)
        .await
        .unwrap();

    let report = engine.cleanup_old_alerts(30).await.unwrap();
    assert_eq!(report.alerts_deleted, 1);

    assert!(engine.get_alert(open_id).await.unwrap().is_some());
    assert!(engine.get_alert(acked_id).await.unwrap().is_some());
    assert!(engine.get_alert(resolved_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_25_open_alerts_raise_one_overload_meta_alert() {
    let (_store, engine) = create_test_engine_with_threshold(20);
    let t0 = Utc::now();

    for i in 0..25 {
        engine
            .create_alert_at(sample_alert(&format!("hook alert {i}"), 3), t0)
            .await
            .unwrap();
    }

    // Several passes must still produce exactly one meta-alert
    for minutes in 0..5 {
        engine
            .process_escalations_at(t0 + Duration::minutes(minutes))
            .await
            .unwrap();
    }

    let alerts = engine.get_open_alerts(100).await.unwrap();
    let meta: Vec<_> = alerts
        .iter()
        .filter(|a| a.source == SYSTEM_SOURCE && a.title == OVERLOAD_TITLE)
        .collect();

    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].severity, 4);
}

#[tokio::test]
async fn test_stats_window_reflects_lifecycle() {
    let (_store, engine) = create_test_engine();
    let t0 = Utc::now() - Duration::hours(1);

    for severity in [5, 4, 4] {
        engine
            .create_alert_at(sample_alert(&format!("sev {severity}"), severity), t0)
            .await
            .unwrap();
    }
    let resolved = engine
        .create_alert_at(sample_alert("quick fix", 2), t0)
        .await
        .unwrap();
    engine
        .resolve_alert_at(resolved, "ops", None, t0 + Duration::minutes(30))
        .await
        .unwrap();

    let stats = engine.get_alert_stats(7).await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_severity.get(&4), Some(&2));
    assert_eq!(stats.by_status.get("resolved"), Some(&1));

    let p50 = stats.resolution_p50_minutes.unwrap();
    assert!((p50 - 30.0).abs() < 1.0, "p50 was {p50}");
}
