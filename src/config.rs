use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence, testing only)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for all real deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Resolved alerts older than this are deleted by cleanup
        #[serde(default = "default_alert_retention_days")]
        alert_retention_days: u32,

        /// Metric/availability samples older than this are deleted
        #[serde(default = "default_metrics_retention_days")]
        metrics_retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            alert_retention_days: default_alert_retention_days(),
            metrics_retention_days: default_metrics_retention_days(),
        }
    }
}

impl StorageConfig {
    pub fn alert_retention_days(&self) -> u32 {
        match self {
            StorageConfig::None => default_alert_retention_days(),
            StorageConfig::Sqlite {
                alert_retention_days,
                ..
            } => *alert_retention_days,
        }
    }

    pub fn metrics_retention_days(&self) -> u32 {
        match self {
            StorageConfig::None => default_metrics_retention_days(),
            StorageConfig::Sqlite {
                metrics_retention_days,
                ..
            } => *metrics_retention_days,
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./vigil.db")
}

fn default_alert_retention_days() -> u32 {
    30
}

fn default_metrics_retention_days() -> u32 {
    90
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub cron: CronConfig,
}

/// API server section
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_bind_addr")]
    pub bind: SocketAddr,

    /// Bearer token required from non-loopback callers
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind: default_bind_addr(),
            auth_token: None,
            enable_cors: true,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8980".parse().unwrap()
}

fn default_true() -> bool {
    true
}

/// Notification channels and rate limiting
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NotifyConfig {
    pub push: Option<PushConfig>,
    pub email: Option<EmailConfig>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// In production low-priority email delivery is skipped entirely
    #[serde(default)]
    pub production: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PushConfig {
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct RateLimitConfig {
    /// Maximum notifications per fingerprint within the window
    #[serde(default = "default_rate_limit_max")]
    pub max_per_window: u32,

    #[serde(default = "default_rate_limit_window")]
    pub window_minutes: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_rate_limit_max(),
            window_minutes: default_rate_limit_window(),
        }
    }
}

fn default_rate_limit_max() -> u32 {
    10
}

fn default_rate_limit_window() -> u32 {
    5
}

/// Escalation policy parameters
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct EscalationConfig {
    /// Minimum minutes an alert dwells at a level before the next escalation
    #[serde(default = "default_dwell_minutes")]
    pub dwell_minutes: u32,

    /// Highest escalation level; alerts stay open at this level until acknowledged
    #[serde(default = "default_max_level")]
    pub max_level: u32,

    /// Open-alert count above which a system overload meta-alert is raised
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            dwell_minutes: default_dwell_minutes(),
            max_level: default_max_level(),
            overload_threshold: default_overload_threshold(),
        }
    }
}

fn default_dwell_minutes() -> u32 {
    15
}

fn default_max_level() -> u32 {
    3
}

fn default_overload_threshold() -> usize {
    20
}

/// Collector cron section: what to sample and when to raise alerts
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CollectorConfig {
    /// Service endpoints probed each run
    #[serde(default)]
    pub services: Vec<ServiceProbe>,

    #[serde(default)]
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceProbe {
    pub name: String,
    pub url: String,

    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u32,
}

fn default_probe_timeout() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct Thresholds {
    /// Disk usage percentage above which an alert is created
    #[serde(default = "default_disk_pct")]
    pub disk_used_pct: f64,

    /// Memory usage percentage above which an alert is created
    #[serde(default = "default_memory_pct")]
    pub memory_used_pct: f64,

    /// Probe response time above which an alert is created
    #[serde(default = "default_response_time")]
    pub response_time_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            disk_used_pct: default_disk_pct(),
            memory_used_pct: default_memory_pct(),
            response_time_ms: default_response_time(),
        }
    }
}

fn default_disk_pct() -> f64 {
    90.0
}

fn default_memory_pct() -> f64 {
    95.0
}

fn default_response_time() -> u64 {
    5000
}

/// Cron job housekeeping: lock files and append-only logs
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Lease lifetime; a lock older than this is considered stale
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_minutes: u32,

    /// Directory for per-job append-only logs (stderr if unset)
    pub log_dir: Option<PathBuf>,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            lock_ttl_minutes: default_lock_ttl(),
            log_dir: None,
        }
    }
}

impl CronConfig {
    pub fn lock_path(&self, job: &str) -> PathBuf {
        self.lock_dir.join(format!("{job}.lock"))
    }

    pub fn log_path(&self, job: &str) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| dir.join(format!("{job}.log")))
    }
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("./run")
}

fn default_lock_ttl() -> u32 {
    10
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
