use std::sync::Arc;

use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use vigil::{
    aggregator::MetricsAggregator,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::read_config_file,
    lifecycle::AlertEngine,
    notify::Dispatcher,
    policy::EscalationPolicy,
    storage::build_store,
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "vigil.json")]
    config: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("vigil", LevelFilter::DEBUG),
        ("api", LevelFilter::DEBUG),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.config)?;

    let store = build_store(&config.storage).await?;
    let dispatcher = Dispatcher::from_config(&config.notify, store.clone())?;
    let engine = Arc::new(AlertEngine::new(
        store.clone(),
        dispatcher,
        EscalationPolicy::from_config(&config.escalation),
        config.escalation.overload_threshold,
    ));
    let aggregator = Arc::new(MetricsAggregator::new(store.clone()));

    let state = ApiState::new(
        engine,
        aggregator,
        store.clone(),
        config.storage.alert_retention_days(),
    );

    let api_config = ApiConfig {
        bind_addr: config.api.bind,
        auth_token: config.api.auth_token.clone(),
        enable_cors: config.api.enable_cors,
    };

    spawn_api_server(api_config, state).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    store.close().await?;

    Ok(())
}
