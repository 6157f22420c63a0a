//! Escalation policy: per-severity ordered escalation steps
//!
//! The policy maps an alert's severity and escalation level to how long the
//! alert must dwell before the next escalation, which notification priority
//! the escalation fires at, and which channels it goes out on. Extracted into
//! an explicit structure so the scheduler contains no ad-hoc timing rules.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::config::EscalationConfig;

/// Which notification channels a send goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub push: bool,
    pub email: bool,
}

impl ChannelSet {
    pub fn all() -> Self {
        Self {
            push: true,
            email: true,
        }
    }

    pub fn push_only() -> Self {
        Self {
            push: true,
            email: false,
        }
    }
}

/// One escalation transition: the dwell time gating it, and the priority and
/// channels of the notification it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationStep {
    /// Minimum time at the previous level before this transition
    pub dwell: Duration,

    /// Notification priority (1-5) for this level
    pub priority: u8,

    pub channels: ChannelSet,
}

/// Ordered escalation steps for one severity. `steps[i]` is the transition
/// to escalation level `i + 1`.
#[derive(Debug, Clone)]
pub struct SeverityPolicy {
    steps: Vec<EscalationStep>,
}

impl SeverityPolicy {
    pub fn level_max(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Step for the transition to `next_level` (1-based).
    pub fn step(&self, next_level: u32) -> Option<&EscalationStep> {
        if next_level == 0 {
            return None;
        }
        self.steps.get(next_level as usize - 1)
    }
}

/// Per-severity escalation policy.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    severities: [SeverityPolicy; 5],
}

impl EscalationPolicy {
    /// Build the policy from configuration: every level waits the configured
    /// dwell and raises the notification priority one step, capped at 5.
    pub fn from_config(config: &EscalationConfig) -> Self {
        let dwell = Duration::minutes(config.dwell_minutes as i64);
        let severities = std::array::from_fn(|idx| {
            let severity = idx as u8 + 1;
            let steps = (1..=config.max_level)
                .map(|level| EscalationStep {
                    dwell,
                    priority: (severity as u32 + level).min(5) as u8,
                    channels: ChannelSet::all(),
                })
                .collect();
            SeverityPolicy { steps }
        });

        Self { severities }
    }

    fn for_severity(&self, severity: u8) -> &SeverityPolicy {
        let idx = severity.clamp(1, 5) as usize - 1;
        &self.severities[idx]
    }

    pub fn level_max(&self, severity: u8) -> u32 {
        self.for_severity(severity).level_max()
    }

    /// Dwell required at `current_level` before escalating past it, or `None`
    /// if the alert is already fully escalated.
    pub fn dwell_at(&self, severity: u8, current_level: u32) -> Option<Duration> {
        self.for_severity(severity)
            .step(current_level + 1)
            .map(|step| step.dwell)
    }

    /// Notification parameters for the transition to `next_level`.
    pub fn step(&self, severity: u8, next_level: u32) -> Option<&EscalationStep> {
        self.for_severity(severity).step(next_level)
    }

    /// Priority of the initial notification when an alert is created.
    pub fn base_priority(severity: u8) -> u8 {
        severity.clamp(1, 5)
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::from_config(&EscalationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_shape() {
        let policy = EscalationPolicy::default();

        for severity in 1..=5 {
            assert_eq!(policy.level_max(severity), 3);
            assert_eq!(
                policy.dwell_at(severity, 0),
                Some(Duration::minutes(15)),
                "severity {severity} level 0 dwell"
            );
        }

        // Fully escalated: no further step
        assert_eq!(policy.dwell_at(3, 3), None);
        assert!(policy.step(3, 4).is_none());
    }

    #[test]
    fn test_priority_raises_one_step_per_level_capped() {
        let policy = EscalationPolicy::default();

        assert_eq!(policy.step(2, 1).unwrap().priority, 3);
        assert_eq!(policy.step(2, 2).unwrap().priority, 4);
        assert_eq!(policy.step(2, 3).unwrap().priority, 5);

        // Severity 5 is already at the cap
        assert_eq!(policy.step(5, 1).unwrap().priority, 5);
        assert_eq!(policy.step(5, 3).unwrap().priority, 5);
    }

    #[test]
    fn test_out_of_range_severity_is_clamped() {
        let policy = EscalationPolicy::default();
        assert_eq!(policy.level_max(0), 3);
        assert_eq!(policy.level_max(9), 3);
        assert_eq!(EscalationPolicy::base_priority(0), 1);
        assert_eq!(EscalationPolicy::base_priority(9), 5);
    }

    #[test]
    fn test_configured_dwell_and_levels() {
        let config = EscalationConfig {
            dwell_minutes: 5,
            max_level: 2,
            overload_threshold: 20,
        };
        let policy = EscalationPolicy::from_config(&config);

        assert_eq!(policy.level_max(4), 2);
        assert_eq!(policy.dwell_at(4, 0), Some(Duration::minutes(5)));
        assert_eq!(policy.dwell_at(4, 2), None);
    }
}
