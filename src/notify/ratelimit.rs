//! Sliding-window notification rate limiter
//!
//! The window lives in the shared store, not in process memory: every
//! invocation of the engine is short-lived (API request or cron run), so a
//! process-local window would reset on each run and never actually limit
//! anything. The store's `reserve_send` prunes, counts, and records in one
//! atomic step.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::RateLimitConfig;
use crate::storage::{AlertStore, StoreResult};

/// Derive the default rate-limit fingerprint from a notification title:
/// lowercase, alphanumeric runs kept, everything else collapsed to `-`.
/// Stable across processes and readable in the database.
pub fn fingerprint(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    out
}

/// Durable sliding-window limiter keyed by fingerprint.
pub struct RateLimiter {
    store: Arc<dyn AlertStore>,
    max_per_window: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn AlertStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            max_per_window: config.max_per_window,
            window: Duration::minutes(config.window_minutes as i64),
        }
    }

    /// Whether a send for this fingerprint is admitted right now. Admitted
    /// sends count against the window immediately.
    pub async fn admit(&self, fingerprint: &str) -> StoreResult<bool> {
        self.admit_at(fingerprint, Utc::now()).await
    }

    pub async fn admit_at(&self, fingerprint: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        self.store
            .reserve_send(fingerprint, now, self.window, self.max_per_window)
            .await
    }
}
