//! Metrics collection cron entry point
//!
//! Samples host resources (sysinfo), probes configured service endpoints
//! with bounded timeouts, records everything through the aggregator, and
//! evaluates thresholds. Crossing one creates an alert through the same
//! lifecycle engine everything else uses. Also runs retention cleanup for
//! samples and resolved alerts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use clap::Parser;
use sysinfo::{Disks, System};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use vigil::{
    MetadataValue, NewAlert,
    aggregator::MetricsAggregator,
    config::{Config, ServiceProbe, Thresholds, read_config_file},
    lifecycle::{AlertEngine, SYSTEM_SOURCE},
    lock::JobLock,
    notify::Dispatcher,
    policy::EscalationPolicy,
    storage::{AlertStore, build_store, schema::ProbeStatus},
};

const JOB_NAME: &str = "collect";

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long, default_value = "vigil.json")]
    config: String,
}

fn init(log_path: Option<PathBuf>) -> anyhow::Result<()> {
    let filter = filter::Targets::new().with_targets(vec![
        ("vigil", LevelFilter::DEBUG),
        ("collect", LevelFilter::DEBUG),
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
        info!("collection lock is held by a live run, skipping");
        return Ok(());
    };

    let started = Instant::now();
    info!("collection run started");

    let store = build_store(&config.storage).await?;
    let dispatcher = Dispatcher::from_config(&config.notify, store.clone())?;
    let engine = AlertEngine::new(
        store.clone(),
        dispatcher,
        EscalationPolicy::from_config(&config.escalation),
        config.escalation.overload_threshold,
    );
    let aggregator = MetricsAggregator::new(store.clone());

    match run_collection(&config, &store, &engine, &aggregator).await {
        Ok(()) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            // Record the run itself so the dashboard can count cron activity
            let _ = aggregator
                .record_sample("cron_collect_runtime_ms", elapsed_ms as f64, "ms", JOB_NAME)
                .await;
            info!(elapsed_ms, "collection run complete");
            store.close().await?;
            Ok(())
        }
        Err(e) => {
            error!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "collection run failed: {e}"
            );
            report_cron_failure(&engine, &e.to_string()).await;
            let _ = store.close().await;
            Err(e)
        }
    }
}

async fn run_collection(
    config: &Config,
    store: &Arc<dyn AlertStore>,
    engine: &AlertEngine,
    aggregator: &MetricsAggregator,
) -> anyhow::Result<()> {
    let thresholds = config.collector.thresholds;

    collect_host_metrics(store, engine, aggregator, &thresholds).await?;

    for probe in &config.collector.services {
        probe_service(store, engine, aggregator, probe, &thresholds).await?;
    }

    // Retention, owned by the respective components
    aggregator
        .cleanup_old_data(config.storage.metrics_retention_days())
        .await?;
    engine
        .cleanup_old_alerts(config.storage.alert_retention_days())
        .await?;

    Ok(())
}

/// Sample CPU, memory, and disk usage and evaluate their thresholds.
async fn collect_host_metrics(
    store: &Arc<dyn AlertStore>,
    engine: &AlertEngine,
    aggregator: &MetricsAggregator,
    thresholds: &Thresholds,
) -> anyhow::Result<()> {
    let host = System::host_name().unwrap_or_else(|| "unknown".to_string());

    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_usage();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu_usage();

    let cpu_pct = sys.global_cpu_usage() as f64;
    aggregator
        .record_sample("cpu_used_pct", cpu_pct, "%", &host)
        .await?;

    let memory_pct = if sys.total_memory() > 0 {
        sys.used_memory() as f64 / sys.total_memory() as f64 * 100.0
    } else {
        0.0
    };
    aggregator
        .record_sample("memory_used_pct", memory_pct, "%", &host)
        .await?;

    if memory_pct > thresholds.memory_used_pct {
        raise_threshold_alert(
            store,
            engine,
            NewAlert::new(
                format!("Memory usage high on {host}"),
                format!(
                    "Memory usage is at {memory_pct:.1}% (threshold: {:.1}%)",
                    thresholds.memory_used_pct
                ),
            )
            .severity(3)
            .source("collector")
            .meta("memory_used_pct", MetadataValue::Float(memory_pct)),
        )
        .await;
    }

    let disks = Disks::new_with_refreshed_list();
    for disk in disks.list() {
        let total = disk.total_space();
        if total == 0 {
            continue;
        }
        let used_pct = (total - disk.available_space()) as f64 / total as f64 * 100.0;
        let mount = disk.mount_point().to_string_lossy().to_string();

        aggregator
            .record_sample("disk_used_pct", used_pct, "%", &mount)
            .await?;

        if used_pct > thresholds.disk_used_pct {
            raise_threshold_alert(
                store,
                engine,
                NewAlert::new(
                    format!("Disk usage high on {mount}"),
                    format!(
                        "Disk usage on {mount} is at {used_pct:.1}% (threshold: {:.1}%)",
                        thresholds.disk_used_pct
                    ),
                )
                .severity(4)
                .source("collector")
                .meta("disk_used_pct", MetadataValue::Float(used_pct)),
            )
            .await;
        }
    }

    debug!("host metrics collected (cpu {cpu_pct:.1}%, memory {memory_pct:.1}%)");

    Ok(())
}

/// Probe one service endpoint, record the result, evaluate thresholds.
async fn probe_service(
    store: &Arc<dyn AlertStore>,
    engine: &AlertEngine,
    aggregator: &MetricsAggregator,
    probe: &ServiceProbe,
    thresholds: &Thresholds,
) -> anyhow::Result<()> {
    trace!("probing {} at {}", probe.name, probe.url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(probe.timeout_secs as u64))
        .build()
        .expect("Failed to build HTTP client");

    let start = Instant::now();
    let result = client.get(&probe.url).send().await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(response) if response.status().is_success() => {
            aggregator
                .record_availability(&probe.name, ProbeStatus::Up, Some(response_time_ms), None)
                .await?;
            aggregator
                .record_sample(
                    "response_time_ms",
                    response_time_ms as f64,
                    "ms",
                    &probe.name,
                )
                .await?;

            if response_time_ms > thresholds.response_time_ms {
                raise_threshold_alert(
                    store,
                    engine,
                    NewAlert::new(
                        format!("Service {} responding slowly", probe.name),
                        format!(
                            "{} answered in {response_time_ms}ms (threshold: {}ms)",
                            probe.url, thresholds.response_time_ms
                        ),
                    )
                    .severity(3)
                    .source("collector"),
                )
                .await;
            }
        }
        Ok(response) => {
            let error = format!("unexpected status code: {}", response.status());
            warn!("{}: {error}", probe.name);
            aggregator
                .record_availability(
                    &probe.name,
                    ProbeStatus::Down,
                    Some(response_time_ms),
                    Some(error.clone()),
                )
                .await?;
            raise_down_alert(store, engine, probe, &error).await;
        }
        Err(e) => {
            let error = e.to_string();
            warn!("{}: probe failed: {error}", probe.name);
            aggregator
                .record_availability(&probe.name, ProbeStatus::Down, None, Some(error.clone()))
                .await?;
            raise_down_alert(store, engine, probe, &error).await;
        }
    }

    Ok(())
}

async fn raise_down_alert(
    store: &Arc<dyn AlertStore>,
    engine: &AlertEngine,
    probe: &ServiceProbe,
    error: &str,
) {
    raise_threshold_alert(
        store,
        engine,
        NewAlert::new(
            format!("Service {} is down", probe.name),
            format!("{} is unreachable: {error}", probe.url),
        )
        .severity(5)
        .source("collector")
        .meta("url", MetadataValue::String(probe.url.to_string())),
    )
    .await;
}

/// Create a threshold alert unless the same condition is already unresolved.
/// One open alert per condition; the rate limiter additionally bounds the
/// notification volume.
async fn raise_threshold_alert(
    store: &Arc<dyn AlertStore>,
    engine: &AlertEngine,
    alert: NewAlert,
) {
    match store.has_unresolved(&alert.source, &alert.title).await {
        Ok(true) => {
            debug!("'{}' already has an unresolved alert", alert.title);
            return;
        }
        Ok(false) => {}
        Err(e) => {
            warn!("could not check for existing alert: {e}");
            return;
        }
    }

    if let Err(e) = engine.create_alert(alert).await {
        warn!("failed to create threshold alert: {e}");
    }
}

/// Best-effort system alert about the cron's own failure. Must never mask
/// the original error.
async fn report_cron_failure(engine: &AlertEngine, reason: &str) {
    let alert = NewAlert::new(
        "Metrics collection failed",
        format!("The collection cron aborted: {reason}"),
    )
    .severity(4)
    .source(SYSTEM_SOURCE);

    if let Err(e) = engine.create_alert(alert).await {
        warn!("failed to create system alert for cron failure: {e}");
    }
}
