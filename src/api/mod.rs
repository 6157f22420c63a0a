//! REST API for the alert engine
//!
//! The only way external callers (hooks, dashboard, humans) create, query,
//! acknowledge, and resolve alerts.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared engine/store handles** via [`ApiState`]
//! - **Permissive CORS**, loopback-trusted auth with bearer token for others
//!
//! ## Endpoints
//!
//! - `GET /alerts` - Unresolved alerts, newest first
//! - `GET /alert/{id}` - One alert with its action log
//! - `GET /stats` - Alert statistics over a bounded window
//! - `GET /health` - Store reachability
//! - `POST /create` - Create an alert
//! - `POST /test` - Create a synthetic test alert
//! - `POST /escalation` - Run one escalation pass
//! - `PUT /acknowledge/{id}` - Acknowledge an open alert
//! - `PUT /resolve/{id}` - Resolve an alert
//! - `DELETE /cleanup` - Remove old resolved alerts

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tracing::info;

use middleware::auth::AuthState;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "127.0.0.1:8980")
    pub bind_addr: SocketAddr,

    /// Bearer token required from non-loopback callers
    pub auth_token: Option<String>,

    /// Enable CORS for the dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8980".parse().unwrap(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = Router::new()
        .route("/alerts", get(routes::alerts::list_alerts))
        .route("/alert/:id", get(routes::alerts::get_alert))
        .route("/stats", get(routes::stats::get_stats))
        .route("/health", get(routes::health::health_check))
        .route("/create", post(routes::alerts::create_alert))
        .route("/test", post(routes::alerts::create_test_alert))
        .route("/escalation", post(routes::admin::run_escalation))
        .route("/acknowledge/:id", put(routes::alerts::acknowledge_alert))
        .route("/resolve/:id", put(routes::alerts::resolve_alert))
        .route("/cleanup", delete(routes::admin::cleanup_alerts))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    // Auth is always mounted: loopback callers pass, everyone else needs
    // the configured bearer token.
    let auth_state = AuthState {
        token: config.auth_token,
    };
    app = app.layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth::auth_middleware,
    ));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
