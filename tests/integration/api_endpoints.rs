//! Integration tests for API endpoints
//!
//! These verify the REST surface consumed by the dashboard and hooks:
//! response shapes, status codes, parameter clamping, and the no-op
//! semantics of acknowledge/resolve.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use crate::helpers::{sample_alert, spawn_test_api};

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let api = spawn_test_api().await;

    let client = reqwest::Client::new();
    let response = client.get(api.url("/health")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_create_alert_returns_201_with_id() {
    let api = spawn_test_api().await;

    let client = reqwest::Client::new();
    let response = client
        .post(api.url("/create"))
        .json(&json!({
            "title": "Invoice batch failed",
            "message": "23 invoices were not generated",
            "severity": 4,
            "source": "billing",
            "metadata": {"batch_id": 991}
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    let alert_id = body["alert_id"].as_i64().unwrap();
    assert!(alert_id > 0);

    // Round-trip through GET /alert/{id}
    let response = client
        .get(api.url(&format!("/alert/{alert_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["alert"]["title"], "Invoice batch failed");
    assert_eq!(body["alert"]["severity"], 4);
    assert_eq!(body["alert"]["status"], "open");
    assert_eq!(body["alert"]["metadata"]["batch_id"], 991);
    assert_eq!(body["actions"][0]["action"], "created");
}

#[tokio::test]
async fn test_create_alert_missing_fields_is_400() {
    let api = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .post(api.url("/create"))
        .json(&json!({"message": "no title"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(api.url("/create"))
        .json(&json!({"title": "no message"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Empty strings are rejected by the engine's validation
    let response = client
        .post(api.url("/create"))
        .json(&json!({"title": "  ", "message": "m"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_alerts_shape_and_filter() {
    let api = spawn_test_api().await;

    for i in 0..3 {
        api.engine
            .create_alert(sample_alert(&format!("alert {i}"), 3))
            .await
            .unwrap();
    }

    let client = reqwest::Client::new();
    let response = client
        .get(api.url("/alerts?status=open&limit=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["alerts"].as_array().unwrap().len(), 2);
    assert!(body["timestamp"].is_string());

    // Unsupported filter values are a client error
    let response = client
        .get(api.url("/alerts?status=resolved"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_missing_alert_is_404() {
    let api = spawn_test_api().await;

    let client = reqwest::Client::new();
    let response = client.get(api.url("/alert/424242")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_acknowledge_and_resolve_flow() {
    let api = spawn_test_api().await;
    let id = api
        .engine
        .create_alert(sample_alert("needs attention", 4))
        .await
        .unwrap();

    let client = reqwest::Client::new();

    let response = client
        .put(api.url(&format!("/acknowledge/{id}")))
        .json(&json!({"user": "alice", "notes": "looking into it"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "acknowledged");

    // Acknowledging again is a 404 no-op, not a server error
    let response = client
        .put(api.url(&format!("/acknowledge/{id}")))
        .json(&json!({"user": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Resolve works from acknowledged, with no body at all
    let response = client
        .put(api.url(&format!("/resolve/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Resolving again is a 404 no-op
    let response = client
        .put(api.url(&format!("/resolve/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_test_endpoint_creates_synthetic_alert() {
    let api = spawn_test_api().await;

    let client = reqwest::Client::new();
    let response = client.post(api.url("/test")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let alert_id = body["alert_id"].as_i64().unwrap();

    let (alert, _) = api.engine.get_alert(alert_id).await.unwrap().unwrap();
    assert_eq!(alert.source, "test");
}

#[tokio::test]
async fn test_stats_days_are_clamped_to_90() {
    let api = spawn_test_api().await;
    api.engine
        .create_alert(sample_alert("for stats", 2))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(api.url("/stats?days=200"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["period_days"], 90);
    assert_eq!(body["stats"]["total"], 1);
}

#[tokio::test]
async fn test_escalation_endpoint_reports_count() {
    let api = spawn_test_api().await;
    let t0 = Utc::now() - Duration::minutes(20);
    api.engine
        .create_alert_at(sample_alert("old enough to escalate", 5), t0)
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client.post(api.url("/escalation")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["escalated_count"], 1);
}

#[tokio::test]
async fn test_cleanup_endpoint_reports_deletions() {
    let api = spawn_test_api().await;
    let ancient = Utc::now() - Duration::days(90);

    let id = api
        .engine
        .create_alert_at(sample_alert("long gone", 1), ancient)
        .await
        .unwrap();
    api.engine
        .resolve_alert_at(id, "ops", None, ancient)
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .delete(api.url("/cleanup?days=30"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["deleted_alerts"], 1);
    assert_eq!(body["retention_days"], 30);
}
