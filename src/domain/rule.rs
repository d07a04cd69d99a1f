//! Alert rule domain types
//!
//! Defines validated types for rules, comparison operators and severity levels.
//! Rules are owned by an external store; the engine only reads snapshots.

use super::sample::MetricType;
use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational, no action needed
    Info,
    /// Attention recommended
    Warning,
    /// Action required soon
    Critical,
    /// Immediate action required
    Emergency,
}

impl AlertSeverity {
    /// All severity levels, lowest first
    pub const ALL: [AlertSeverity; 4] = [
        AlertSeverity::Info,
        AlertSeverity::Warning,
        AlertSeverity::Critical,
        AlertSeverity::Emergency,
    ];

    /// Lower-case name used in payloads and config
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
            Self::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            "emergency" => Ok(Self::Emergency),
            _ => Err(DomainError::InvalidSeverity(s.to_string())),
        }
    }
}

/// Comparison operator between a sample value and the rule threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// value > threshold
    Gt,
    /// value < threshold
    Lt,
    /// value == threshold (with epsilon for floats)
    Eq,
    /// value >= threshold
    Gte,
    /// value <= threshold
    Lte,
}

impl Comparison {
    /// Evaluate `value <op> threshold`
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        const EPSILON: f64 = 1e-6;

        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Eq => (value - threshold).abs() < EPSILON,
            Self::Gte => value >= threshold,
            Self::Lte => value <= threshold,
        }
    }

    /// Operator symbol for messages
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "=",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparison {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gt" | ">" => Ok(Self::Gt),
            "lt" | "<" => Ok(Self::Lt),
            "eq" | "=" | "==" => Ok(Self::Eq),
            "gte" | ">=" => Ok(Self::Gte),
            "lte" | "<=" => Ok(Self::Lte),
            _ => Err(DomainError::InvalidComparison(s.to_string())),
        }
    }
}

/// Alert rule definition
///
/// `duration` and `silence` are always whole time spans; the configuration
/// layer is the only place where raw numbers are converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Metric to monitor
    pub metric: MetricType,
    /// Comparison between sample value and threshold
    pub comparison: Comparison,
    /// Threshold value
    pub threshold: f64,
    /// Continuous hold required before the rule triggers
    pub duration: Duration,
    /// Alert severity
    pub severity: AlertSeverity,
    /// Notification channel ids
    pub channels: Vec<String>,
    /// Minimum time between notifications for the same open alert
    ///
    /// Zero disables re-notification: the alert is announced once.
    pub silence: Duration,
    /// Whether rule is enabled
    pub enabled: bool,
    /// Optional custom message
    pub message: Option<String>,
}

impl AlertRule {
    /// Create a new alert rule that triggers immediately and never re-notifies
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric: MetricType,
        comparison: Comparison,
        threshold: f64,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric,
            comparison,
            threshold,
            duration: Duration::ZERO,
            severity,
            channels: Vec::new(),
            silence: Duration::ZERO,
            enabled: true,
            message: None,
        }
    }

    /// Set sustained duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set silence window
    pub fn with_silence(mut self, silence: Duration) -> Self {
        self.silence = silence;
        self
    }

    /// Set notification channels
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Set a custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Disable the rule
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Evaluate the rule condition against a value
    pub fn matches(&self, value: f64) -> bool {
        self.comparison.evaluate(value, self.threshold)
    }

    /// Render the alert message for an observed value
    pub fn render_message(&self, value: f64) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => format!(
                "{}: {} {} {} (current: {:.2})",
                self.name, self.metric, self.comparison, self.threshold, value
            ),
        }
    }
}
