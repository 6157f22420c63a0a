//! Escalation cron entry point
//!
//! Invoked every few minutes by an external scheduler. Acquires its own
//! lock (a held lock is a clean 0-exit skip), runs one escalation pass, and
//! logs start/stop/duration to an append-only log. An unhandled failure
//! creates a system alert before exiting 1.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Duration;
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use vigil::{
    NewAlert,
    config::{Config, read_config_file},
    lifecycle::{AlertEngine, SYSTEM_SOURCE},
    lock::JobLock,
    notify::Dispatcher,
    policy::EscalationPolicy,
    storage::build_store,
};

const JOB_NAME: &str = "escalate";

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "vigil.json")]
    config: String,
}

fn init(log_path: Option<PathBuf>) -> anyhow::Result<()> {
    let filter = filter::Targets::new().with_targets(vec![
        ("vigil", LevelFilter::DEBUG),
        ("escalate", LevelFilter::DEBUG),
    ]);

    let registry = tracing_subscriber::registry().with(filter);

    match log_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::sync::Mutex::new(file))
                        .compact()
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .compact()
                        .with_ansi(false),
                )
                .init();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let config = read_config_file(&args.config)?;
    init(config.cron.log_path(JOB_NAME))?;
    trace!("started with args: {args:?}");

    let ttl = Duration::minutes(config.cron.lock_ttl_minutes as i64);
    let Some(_guard) = JobLock::acquire(config.cron.lock_path(JOB_NAME), ttl)? else {
        // Contention means a previous run is still working; skip cleanly
        info!("escalation lock is held by a live run, skipping");
        return Ok(());
    };

    let started = Instant::now();
    info!("escalation run started");

    let engine = build_engine(&config).await?;

    match engine.process_escalations().await {
        Ok(escalated) => {
            info!(
                escalated,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "escalation run complete"
            );
            engine.store().close().await?;
            Ok(())
        }
        Err(e) => {
            error!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "escalation run failed: {e}"
            );
            report_cron_failure(&engine, &e.to_string()).await;
            let _ = engine.store().close().await;
            Err(e.into())
        }
    }
}

async fn build_engine(config: &Config) -> anyhow::Result<AlertEngine> {
    let store = build_store(&config.storage).await?;
    let dispatcher = Dispatcher::from_config(&config.notify, store.clone())?;

    Ok(AlertEngine::new(
        store,
        dispatcher,
        EscalationPolicy::from_config(&config.escalation),
        config.escalation.overload_threshold,
    ))
}

/// Best-effort system alert about the cron's own failure. Must never mask
/// the original error.
async fn report_cron_failure(engine: &AlertEngine, reason: &str) {
    let alert = NewAlert::new(
        "Escalation processing failed",
        format!("The escalation cron aborted: {reason}"),
    )
    .severity(4)
    .source(SYSTEM_SOURCE);

    if let Err(e) = engine.create_alert(alert).await {
        warn!("failed to create system alert for cron failure: {e}");
    }
}
