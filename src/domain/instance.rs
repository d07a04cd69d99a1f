//! Alert instance domain types
//!
//! An alert instance is one lifecycle occurrence of a rule's breach, from
//! trigger to recovery, together with its notification attempt log.

use super::rule::{AlertRule, AlertSeverity, Comparison};
use super::sample::MetricType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Alert state
///
/// A rule without a live instance is implicitly inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Condition held for the debounce duration
    Triggered,
    /// User acknowledged but not recovered
    Acknowledged,
    /// Condition no longer met; terminal
    Recovered,
}

impl AlertState {
    /// Whether the instance still blocks a new instance for its rule
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Recovered)
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triggered => write!(f, "TRIGGERED"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::Recovered => write!(f, "RECOVERED"),
        }
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// Attempt failed and another attempt is scheduled
    Retrying,
    /// Payload accepted by the destination
    Delivered,
    /// Attempt failed and no further attempt will be made
    Failed,
}

impl AttemptOutcome {
    /// Whether this outcome ends the attempt sequence
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retrying)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retrying => write!(f, "retrying"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable record of one delivery attempt on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    /// Channel id
    pub channel: String,
    /// 1-based attempt index for this alert and channel
    ///
    /// Keeps increasing across dispatches; assigned when the attempt is
    /// appended to the alert.
    pub attempt: u32,
    /// Dispatch the attempt belongs to (see [`AlertInstance::dispatches`])
    #[serde(default)]
    pub dispatch: u32,
    /// Attempt outcome
    pub outcome: AttemptOutcome,
    /// Error detail for failed attempts
    pub error: Option<String>,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
}

impl NotificationAttempt {
    /// Successful attempt
    pub fn delivered(channel: impl Into<String>, attempt: u32) -> Self {
        Self {
            channel: channel.into(),
            attempt,
            dispatch: 0,
            outcome: AttemptOutcome::Delivered,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Tag the attempt with its dispatch number
    pub fn in_dispatch(mut self, dispatch: u32) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Failed attempt, terminal or not
    pub fn failed(
        channel: impl Into<String>,
        attempt: u32,
        error: impl Into<String>,
        terminal: bool,
    ) -> Self {
        Self {
            channel: channel.into(),
            attempt,
            dispatch: 0,
            outcome: if terminal {
                AttemptOutcome::Failed
            } else {
                AttemptOutcome::Retrying
            },
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// One lifecycle occurrence of a rule breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    /// Unique alert ID
    pub id: String,
    /// Rule ID that triggered this alert
    pub rule_id: String,
    /// Rule name at trigger time
    pub rule_name: String,
    /// Alert severity
    pub severity: AlertSeverity,
    /// Metric type
    pub metric: MetricType,
    /// Comparison operator
    pub comparison: Comparison,
    /// Threshold value
    pub threshold: f64,
    /// Current state
    pub state: AlertState,
    /// Value that caused the trigger
    pub value: f64,
    /// Alert message
    pub message: String,
    /// When the alert triggered
    pub triggered_at: DateTime<Utc>,
    /// When the alert was acknowledged
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Who acknowledged the alert
    pub acknowledged_by: Option<String>,
    /// When the alert recovered
    pub recovered_at: Option<DateTime<Utc>>,
    /// When a notification dispatch was last initiated
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Number of notification dispatches started
    #[serde(default)]
    pub dispatches: u32,
    /// Whether the recovery notification was dispatched
    #[serde(default)]
    pub recovery_notified: bool,
    /// Delivery attempts in the order they finished
    pub notifications: Vec<NotificationAttempt>,
}

impl AlertInstance {
    /// Create a new triggered alert for a rule
    pub fn triggered(rule: &AlertRule, value: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            metric: rule.metric.clone(),
            comparison: rule.comparison,
            threshold: rule.threshold,
            state: AlertState::Triggered,
            value,
            message: rule.render_message(value),
            triggered_at: at,
            acknowledged_at: None,
            acknowledged_by: None,
            recovered_at: None,
            last_notified_at: None,
            dispatches: 0,
            recovery_notified: false,
            notifications: Vec::new(),
        }
    }

    /// Whether the alert is still open
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Mark alert as acknowledged
    pub fn acknowledge(&mut self, user: impl Into<String>, at: DateTime<Utc>) {
        self.state = AlertState::Acknowledged;
        self.acknowledged_at = Some(at);
        self.acknowledged_by = Some(user.into());
    }

    /// Mark alert as recovered
    pub fn recover(&mut self, at: DateTime<Utc>) {
        self.state = AlertState::Recovered;
        self.recovered_at = Some(at);
    }

    /// Start a new dispatch and return its number
    pub fn next_dispatch(&mut self) -> u32 {
        self.dispatches += 1;
        self.dispatches
    }

    /// Append an attempt, numbering it after the channel's last attempt
    pub fn push_attempt(&mut self, mut attempt: NotificationAttempt) -> NotificationAttempt {
        attempt.attempt = next_attempt_index(
            self.notifications.iter().map(|a| (a.channel.as_str(), a.attempt)),
            &attempt.channel,
        );
        self.notifications.push(attempt.clone());
        attempt
    }

    /// Channels whose most recent terminal attempt failed, sorted
    pub fn failed_channels(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        let mut failed = Vec::new();

        for attempt in self.notifications.iter().rev() {
            if !attempt.outcome.is_terminal() || !seen.insert(attempt.channel.as_str()) {
                continue;
            }
            if attempt.outcome == AttemptOutcome::Failed {
                failed.push(attempt.channel.as_str());
            }
        }

        failed.sort_unstable();
        failed
    }
}

/// Next 1-based attempt index for `channel` given `(channel, index)` records
pub fn next_attempt_index<'a>(
    records: impl IntoIterator<Item = (&'a str, u32)>,
    channel: &str,
) -> u32 {
    records
        .into_iter()
        .filter(|(c, _)| *c == channel)
        .map(|(_, index)| index)
        .max()
        .unwrap_or(0)
        + 1
}
