//! Alert rule and channel configuration
//!
//! TOML-friendly rule and channel definitions. Raw numbers and strings are
//! converted into domain types here and nowhere else; time spans are whole
//! seconds with the unit in the field name.

use crate::domain::{AlertRule, AlertSeverity, Channel, Comparison, MetricType, WebhookKind};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// A file holding `[[rules]]` entries
///
/// Any other table in the file is ignored, so the main configuration file
/// can be used as a rule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Alert rules
    #[serde(default)]
    pub rules: Vec<AlertRuleConfig>,
}

impl RuleSet {
    /// Load rules from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(format!("{}: {}", path_str, e)))
    }

    /// Convert enabled entries to alert rules
    pub fn to_alert_rules(&self) -> Result<Vec<AlertRule>, ConfigError> {
        to_alert_rules(&self.rules)
    }
}

/// Convert enabled rule configs to alert rules, rejecting duplicate ids
pub fn to_alert_rules(rules: &[AlertRuleConfig]) -> Result<Vec<AlertRule>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(rules.len());

    for rule in rules {
        if !seen.insert(rule.id.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "rules.id".to_string(),
                message: format!("Duplicate rule id: {}", rule.id),
            });
        }
        if rule.enabled {
            out.push(rule.to_alert_rule()?);
        }
    }

    Ok(out)
}

/// Alert rule configuration (TOML-friendly format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    /// Rule identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Metric name
    pub metric: String,
    /// Comparison (`gt`, `lt`, `eq`, `gte`, `lte` or the symbol form)
    pub comparison: String,
    /// Threshold value
    pub threshold: f64,
    /// Severity level
    pub severity: String,
    /// Continuous hold before triggering, in seconds
    #[serde(default)]
    pub duration_secs: u64,
    /// Re-notification window, in seconds; 0 notifies once
    #[serde(default)]
    pub silence_secs: u64,
    /// Channel ids to notify
    #[serde(default)]
    pub channels: Vec<String>,
    /// Whether rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Custom alert message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

impl AlertRuleConfig {
    /// Convert to AlertRule
    pub fn to_alert_rule(&self) -> Result<AlertRule, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "rules.id".to_string(),
                message: "Rule id must not be empty".to_string(),
            });
        }
        if !self.threshold.is_finite() {
            return Err(self.invalid("threshold", format!("Threshold must be finite: {}", self.threshold)));
        }

        let metric = self.parse_metric()?;
        let comparison = self.parse_comparison()?;
        let severity = self.parse_severity()?;

        let mut rule = AlertRule::new(
            self.id.clone(),
            self.name.clone(),
            metric,
            comparison,
            self.threshold,
            severity,
        )
        .with_duration(Duration::from_secs(self.duration_secs))
        .with_silence(Duration::from_secs(self.silence_secs))
        .with_channels(self.channels.iter().cloned());

        if let Some(message) = &self.message {
            rule = rule.with_message(message.clone());
        }

        if !self.enabled {
            rule = rule.disabled();
        }

        Ok(rule)
    }

    fn parse_metric(&self) -> Result<MetricType, ConfigError> {
        MetricType::new(&self.metric).map_err(|e| self.invalid("metric", e.to_string()))
    }

    fn parse_comparison(&self) -> Result<Comparison, ConfigError> {
        self.comparison
            .parse()
            .map_err(|_| self.invalid("comparison", format!("Unknown comparison: {}", self.comparison)))
    }

    fn parse_severity(&self) -> Result<AlertSeverity, ConfigError> {
        self.severity
            .parse()
            .map_err(|_| self.invalid("severity", format!("Unknown severity level: {}", self.severity)))
    }

    fn invalid(&self, field: &str, message: String) -> ConfigError {
        ConfigError::InvalidValue {
            key: format!("rules.{}.{}", self.id, field),
            message,
        }
    }

    /// Starter rule set written by `alertctl init`
    pub fn default_rules() -> Vec<Self> {
        vec![
            // Sustained CPU pressure
            AlertRuleConfig {
                id: "high-cpu".to_string(),
                name: "High CPU Usage".to_string(),
                metric: "cpu".to_string(),
                comparison: "gt".to_string(),
                threshold: 80.0,
                severity: "warning".to_string(),
                duration_secs: 300,
                silence_secs: 1800,
                channels: vec!["ops".to_string()],
                enabled: true,
                message: None,
            },
            AlertRuleConfig {
                id: "critical-cpu".to_string(),
                name: "Critical CPU Usage".to_string(),
                metric: "cpu".to_string(),
                comparison: "gte".to_string(),
                threshold: 95.0,
                severity: "critical".to_string(),
                duration_secs: 60,
                silence_secs: 600,
                channels: vec!["ops".to_string()],
                enabled: true,
                message: None,
            },
            AlertRuleConfig {
                id: "high-memory".to_string(),
                name: "High Memory Usage".to_string(),
                metric: "memory".to_string(),
                comparison: "gt".to_string(),
                threshold: 90.0,
                severity: "warning".to_string(),
                duration_secs: 120,
                silence_secs: 1800,
                channels: vec!["ops".to_string()],
                enabled: true,
                message: None,
            },
            // Fires on the first full-disk sample
            AlertRuleConfig {
                id: "disk-full".to_string(),
                name: "Disk Almost Full".to_string(),
                metric: "disk".to_string(),
                comparison: "gte".to_string(),
                threshold: 95.0,
                severity: "emergency".to_string(),
                duration_secs: 0,
                silence_secs: 0,
                channels: vec!["ops".to_string()],
                enabled: true,
                message: Some("Disk usage above 95%, writes may start failing".to_string()),
            },
        ]
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel id referenced by rules
    pub id: String,
    /// Webhook URL
    pub url: String,
    /// Payload format; detected from the URL when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Extra request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ChannelConfig {
    /// Convert to Channel
    pub fn to_channel(&self) -> Result<Channel, ConfigError> {
        let invalid = |field: &str, message: String| ConfigError::InvalidValue {
            key: format!("channels.{}.{}", self.id, field),
            message,
        };

        if self.id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "channels.id".to_string(),
                message: "Channel id must not be empty".to_string(),
            });
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid("url", format!("Expected an http(s) URL: {}", self.url)));
        }

        let mut channel = Channel::new(self.id.clone(), self.url.clone());
        if let Some(kind) = &self.kind {
            let kind: WebhookKind = kind
                .parse()
                .map_err(|_| invalid("kind", format!("Unknown channel kind: {}", kind)))?;
            channel = channel.with_kind(kind);
        }
        for (name, value) in &self.headers {
            channel = channel.with_header(name.clone(), value.clone());
        }

        Ok(channel)
    }

    /// Example channel written by `alertctl init`
    pub fn example() -> Self {
        Self {
            id: "ops".to_string(),
            url: "https://hooks.slack.com/services/T000/B000/XXXX".to_string(),
            kind: Some("slack".to_string()),
            headers: BTreeMap::new(),
        }
    }
}

/// Convert channel configs, rejecting duplicate ids
pub fn to_channels(channels: &[ChannelConfig]) -> Result<Vec<Channel>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    channels
        .iter()
        .map(|c| {
            if !seen.insert(c.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "channels.id".to_string(),
                    message: format!("Duplicate channel id: {}", c.id),
                });
            }
            c.to_channel()
        })
        .collect()
}
