//! Helper functions for integration tests

use std::net::SocketAddr;
use std::sync::Arc;

use vigil::NewAlert;
use vigil::aggregator::MetricsAggregator;
use vigil::api::{ApiConfig, ApiState, spawn_api_server};
use vigil::config::NotifyConfig;
use vigil::lifecycle::AlertEngine;
use vigil::notify::Dispatcher;
use vigil::policy::EscalationPolicy;
use vigil::storage::AlertStore;
use vigil::storage::memory::MemoryStore;

pub fn create_test_engine() -> (Arc<dyn AlertStore>, Arc<AlertEngine>) {
    create_test_engine_with_threshold(20)
}

pub fn create_test_engine_with_threshold(
    overload_threshold: usize,
) -> (Arc<dyn AlertStore>, Arc<AlertEngine>) {
    let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::from_config(&NotifyConfig::default(), store.clone())
        .expect("dispatcher construction cannot fail without channels");
    let engine = Arc::new(AlertEngine::new(
        store.clone(),
        dispatcher,
        EscalationPolicy::default(),
        overload_threshold,
    ));

    (store, engine)
}

pub struct TestApi {
    pub addr: SocketAddr,
    pub engine: Arc<AlertEngine>,
}

impl TestApi {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

pub async fn spawn_test_api() -> TestApi {
    let (store, engine) = create_test_engine();
    let aggregator = Arc::new(MetricsAggregator::new(store.clone()));

    let state = ApiState::new(engine.clone(), aggregator, store, 30);

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: Some("test-token".to_string()),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, state).await.unwrap();

    TestApi { addr, engine }
}

pub fn sample_alert(title: &str, severity: u8) -> NewAlert {
    NewAlert::new(title, "integration test alert")
        .severity(severity)
        .source("test")
}
