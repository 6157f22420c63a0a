//! Mutual exclusion for periodic jobs
//!
//! The escalation and collection crons are fired by an external scheduler
//! whose invocations can overlap when a previous run stalls. `JobLock` is a
//! lease file holding the owner's identity and an expiry heartbeat: if the
//! recorded lease has expired the holder is considered dead and the lease is
//! replaced; if it is still live, acquisition fails and the caller skips the
//! run entirely (no retry, no queue).
//!
//! The expiry timestamp replaces a PID-liveness probe so the check behaves
//! identically on every platform. The guard removes the lease on Drop, so
//! every exit path (including panics) releases the lock.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Lease {
    pid: u32,
    host: Option<String>,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Lease {
    fn new(ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            pid: std::process::id(),
            host: sysinfo::System::host_name(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }
}

/// Exclusive lease on a periodic job.
pub struct JobLock;

impl JobLock {
    /// Try to acquire the lease at `path`.
    ///
    /// Returns `Ok(Some(guard))` when this process now holds the lock,
    /// `Ok(None)` when another live process does (the caller must skip this
    /// run), and an error only for unexpected I/O failures.
    pub fn acquire(path: impl AsRef<Path>, ttl: Duration) -> anyhow::Result<Option<LockGuard>> {
        Self::acquire_at(path, ttl, Utc::now())
    }

    pub fn acquire_at(
        path: impl AsRef<Path>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<LockGuard>> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        match Self::try_create(path, ttl, now)? {
            Some(guard) => Ok(Some(guard)),
            None => {
                if Self::is_stale(path, now) {
                    info!("replacing stale lock at {}", path.display());
                    // Losing the removal race to another janitor is fine; the
                    // create_new below decides the single winner.
                    let _ = fs::remove_file(path);
                    Self::try_create(path, ttl, now)
                } else {
                    debug!("lock at {} is held, skipping", path.display());
                    Ok(None)
                }
            }
        }
    }

    fn try_create(
        path: &Path,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<LockGuard>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let lease = Lease::new(ttl, now);
                file.write_all(serde_json::to_string(&lease)?.as_bytes())?;
                debug!("acquired lock at {}", path.display());
                Ok(Some(LockGuard {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// An unreadable or expired lease counts as stale.
    fn is_stale(path: &Path, now: DateTime<Utc>) -> bool {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Lease>(&content) {
                Ok(lease) => lease.expires_at < now,
                Err(e) => {
                    warn!("corrupt lock file at {}: {e}", path.display());
                    true
                }
            },
            Err(_) => true,
        }
    }
}

/// Holds the lease until dropped.
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove lock file {}: {e}", self.path.display());
        } else {
            debug!("released lock at {}", self.path.display());
        }
    }
}
