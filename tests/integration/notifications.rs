//! Dispatcher behavior against a mock push endpoint

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use vigil::NewAlert;
use vigil::config::{NotifyConfig, PushConfig};
use vigil::lifecycle::AlertEngine;
use vigil::notify::{ChannelOutcome, Dispatcher, Notification};
use vigil::policy::EscalationPolicy;
use vigil::storage::AlertStore;
use vigil::storage::memory::MemoryStore;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn push_dispatcher(server: &MockServer, store: Arc<dyn AlertStore>) -> Dispatcher {
    let config = NotifyConfig {
        push: Some(PushConfig {
            url: format!("{}/notify", server.uri()),
            token: None,
        }),
        ..NotifyConfig::default()
    };
    Dispatcher::from_config(&config, store).unwrap()
}

#[tokio::test]
async fn test_rate_limiter_admits_exactly_ten_of_eleven() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(10)
        .mount(&server)
        .await;

    let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::new());
    let dispatcher = push_dispatcher(&server, store);
    let now = Utc::now();

    let note = Notification::new("DB down", "still down", 5);
    let mut delivered = 0;
    let mut rate_limited = 0;

    for _ in 0..11 {
        let report = dispatcher.dispatch_at(&note, now).await;
        match report.push {
            ChannelOutcome::Delivered => delivered += 1,
            ChannelOutcome::RateLimited => rate_limited += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(delivered, 10);
    assert_eq!(rate_limited, 1);
}

#[tokio::test]
async fn test_rate_limit_window_is_shared_across_dispatchers() {
    // Two dispatcher instances over the same store model two separate
    // short-lived process invocations; the window must carry over.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let note = Notification::new("Flapping service", "again", 3);

    let first = push_dispatcher(&server, store.clone());
    for _ in 0..10 {
        assert_eq!(
            first.dispatch_at(&note, now).await.push,
            ChannelOutcome::Delivered
        );
    }
    drop(first);

    let second = push_dispatcher(&server, store);
    assert_eq!(
        second.dispatch_at(&note, now).await.push,
        ChannelOutcome::RateLimited
    );
}

#[tokio::test]
async fn test_push_failure_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::new());
    let dispatcher = push_dispatcher(&server, store.clone());

    let report = dispatcher
        .dispatch(&Notification::new("broken channel", "m", 4))
        .await;
    assert!(matches!(report.push, ChannelOutcome::Failed(_)));
    assert_eq!(report.email, ChannelOutcome::Skipped);
}

#[tokio::test]
async fn test_alert_creation_survives_failing_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::new());
    let dispatcher = push_dispatcher(&server, store.clone());
    let engine = AlertEngine::new(store, dispatcher, EscalationPolicy::default(), 20);

    // The notification fails, the alert is still created
    let id = engine
        .create_alert(NewAlert::new("Payment failed", "gateway rejected batch").severity(4))
        .await
        .unwrap();

    assert!(engine.get_alert(id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_severity_maps_to_push_urgency() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .and(body_partial_json(json!({"priority": "urgent"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::new());
    let dispatcher = push_dispatcher(&server, store.clone());
    let engine = AlertEngine::new(store, dispatcher, EscalationPolicy::default(), 20);

    engine
        .create_alert(NewAlert::new("Everything on fire", "send help").severity(5))
        .await
        .unwrap();
}
