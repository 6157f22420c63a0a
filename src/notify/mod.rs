//! Notification dispatch: rate limiting, priority mapping, channel fan-out
//!
//! The dispatcher sends one logical alert event over the configured channels.
//! Channels are attempted independently; a failure on one never blocks the
//! other, and nothing here retries. The next escalation cycle is the retry.

pub mod email;
pub mod push;
pub mod ratelimit;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::NotifyConfig;
use crate::policy::ChannelSet;
use crate::storage::AlertStore;

use email::EmailChannel;
use push::PushChannel;
use ratelimit::{RateLimiter, fingerprint};

/// One logical notification to be fanned out.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub message: String,

    /// 1-5, 5 = most urgent
    pub priority: u8,

    pub channels: ChannelSet,

    /// Overrides the default fingerprint (derived from the title)
    pub dedupe_key: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, priority: u8) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority: priority.clamp(1, 5),
            channels: ChannelSet::all(),
            dedupe_key: None,
        }
    }

    pub fn channels(mut self, channels: ChannelSet) -> Self {
        self.channels = channels;
        self
    }

    fn fingerprint(&self) -> String {
        self.dedupe_key
            .clone()
            .unwrap_or_else(|| fingerprint(&self.title))
    }
}

/// Outcome of one channel attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "outcome", content = "reason")]
pub enum ChannelOutcome {
    Delivered,
    /// Suppressed by the sliding-window limiter; logged, not a failure
    RateLimited,
    /// Channel not requested, not configured, or downgraded by policy
    Skipped,
    Failed(String),
}

/// Per-channel outcomes for one dispatch call.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub push: ChannelOutcome,
    pub email: ChannelOutcome,
}

impl DispatchReport {
    /// True if at least one channel actually delivered.
    pub fn delivered(&self) -> bool {
        self.push == ChannelOutcome::Delivered || self.email == ChannelOutcome::Delivered
    }

    fn all(outcome: ChannelOutcome) -> Self {
        Self {
            push: outcome.clone(),
            email: outcome,
        }
    }
}

/// Visual/urgency markers for one priority step. A pure lookup, no state.
#[derive(Debug, Clone, Copy)]
pub struct PriorityProfile {
    /// Channel-specific urgency field for push delivery
    pub urgency: &'static str,

    /// Tag/icon marker attached to push messages
    pub tag: &'static str,

    /// Subject prefix for email delivery
    pub subject_prefix: &'static str,
}

/// Map the internal 1-5 priority to channel-specific markers.
pub fn priority_profile(priority: u8) -> PriorityProfile {
    match priority.clamp(1, 5) {
        1 => PriorityProfile {
            urgency: "min",
            tag: "information_source",
            subject_prefix: "[FYI]",
        },
        2 => PriorityProfile {
            urgency: "low",
            tag: "bell",
            subject_prefix: "[LOW]",
        },
        3 => PriorityProfile {
            urgency: "default",
            tag: "warning",
            subject_prefix: "[ALERT]",
        },
        4 => PriorityProfile {
            urgency: "high",
            tag: "exclamation",
            subject_prefix: "[URGENT]",
        },
        _ => PriorityProfile {
            urgency: "urgent",
            tag: "rotating_light",
            subject_prefix: "[CRITICAL]",
        },
    }
}

/// Rate-limited dual-channel notification dispatcher.
pub struct Dispatcher {
    limiter: RateLimiter,
    push: Option<PushChannel>,
    email: Option<EmailChannel>,

    /// Production mode skips low-priority email delivery
    production: bool,
}

impl Dispatcher {
    /// Build the dispatcher from configuration. Channels without config stay
    /// unconfigured and report `Skipped` on every dispatch.
    pub fn from_config(config: &NotifyConfig, store: Arc<dyn AlertStore>) -> anyhow::Result<Self> {
        let push = config.push.as_ref().map(PushChannel::new);
        let email = config
            .email
            .as_ref()
            .map(EmailChannel::new)
            .transpose()?;

        Ok(Self {
            limiter: RateLimiter::new(store, config.rate_limit),
            push,
            email,
            production: config.production,
        })
    }

    /// Send a notification over all requested channels.
    pub async fn dispatch(&self, note: &Notification) -> DispatchReport {
        self.dispatch_at(note, Utc::now()).await
    }

    #[instrument(skip(self, note), fields(title = %note.title, priority = note.priority))]
    pub async fn dispatch_at(&self, note: &Notification, now: DateTime<Utc>) -> DispatchReport {
        let fingerprint = note.fingerprint();

        let admitted = match self.limiter.admit_at(&fingerprint, now).await {
            Ok(admitted) => admitted,
            Err(e) => {
                // A broken limiter must not swallow pages; fail open.
                warn!("rate limiter unavailable, sending anyway: {e}");
                true
            }
        };

        if !admitted {
            debug!("notification rate-limited (fingerprint: {fingerprint})");
            return DispatchReport::all(ChannelOutcome::RateLimited);
        }

        let push_outcome = match (&self.push, note.channels.push) {
            (Some(channel), true) => channel.send(note).await,
            _ => ChannelOutcome::Skipped,
        };

        let email_outcome = match (&self.email, note.channels.email) {
            (Some(channel), true) => {
                if self.production && note.priority <= 2 {
                    debug!("skipping low-priority email in production");
                    ChannelOutcome::Skipped
                } else {
                    channel.send(note).await
                }
            }
            _ => ChannelOutcome::Skipped,
        };

        DispatchReport {
            push: push_outcome,
            email: email_outcome,
        }
    }
}
