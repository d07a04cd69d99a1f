//! Configuration system
//!
//! Handles TOML config file parsing and CLI argument merging. All time spans
//! are whole seconds or milliseconds, named by unit; conversion to
//! `Duration` happens in the accessor methods below.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::alerts::{
    to_alert_rules, to_channels, AlertRuleConfig, ChannelConfig, EvaluatorConfig, LifecycleConfig,
};
use crate::bus::EventBusConfig;
use crate::domain::{AlertRule, Channel};
use crate::error::ConfigError;
use crate::gateway::GatewayConfig;
use crate::notify::DeliveryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Notification delivery settings
    pub notification: NotificationConfig,
    /// Event bus settings
    pub bus: BusConfig,
    /// Subscription gateway settings
    pub gateway: GatewaySettings,
    /// Notification channels
    pub channels: Vec<ChannelConfig>,
    /// Alert rules
    pub rules: Vec<AlertRuleConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Engine tick interval in seconds
    pub check_interval_secs: u64,
    /// Expected spacing between samples of one metric, in seconds
    pub sample_interval_secs: u64,
    /// Sample gap that resets a running hold, in seconds
    pub staleness_secs: u64,
    /// Maximum recovered alerts to keep in history
    pub max_history: usize,
    /// Separate rule file; defaults to the `[[rules]]` of this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            check_interval_secs: 5,
            sample_interval_secs: 5,
            staleness_secs: 15,
            max_history: 1000,
            rules_file: None,
        }
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Attempts per channel per dispatch, including the first
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds; doubles per retry
    pub backoff_base_ms: u64,
    /// Bound on one send in seconds
    pub timeout_secs: u64,
    /// Send a notification when an announced alert recovers
    pub notify_on_recovery: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            timeout_secs: 10,
            notify_on_recovery: true,
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events kept for replay
    pub history_capacity: usize,
    /// Per-subscriber queue length
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            queue_capacity: 256,
        }
    }
}

/// Subscription gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Bound on one send to a connection in milliseconds
    pub send_timeout_ms: u64,
    /// Buffer length for stream subscriptions
    pub queue_capacity: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: 1000,
            queue_capacity: 64,
        }
    }
}

impl Config {
    /// Configuration written by `alertctl init`
    pub fn starter() -> Self {
        Self {
            channels: vec![ChannelConfig::example()],
            rules: AlertRuleConfig::default_rules(),
            ..Self::default()
        }
    }

    /// Engine tick interval
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.general.check_interval_secs)
    }

    /// Evaluator settings
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            sample_interval: Duration::from_secs(self.general.sample_interval_secs),
            staleness: Duration::from_secs(self.general.staleness_secs),
        }
    }

    /// Lifecycle manager settings
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            max_history: self.general.max_history,
        }
    }

    /// Event bus settings
    pub fn bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            history_capacity: self.bus.history_capacity,
            queue_capacity: self.bus.queue_capacity,
        }
    }

    /// Gateway settings
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            send_timeout: Duration::from_millis(self.gateway.send_timeout_ms),
            queue_capacity: self.gateway.queue_capacity,
        }
    }

    /// Channel delivery policy
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts: self.notification.max_attempts,
            backoff_base: Duration::from_millis(self.notification.backoff_base_ms),
            timeout: Duration::from_secs(self.notification.timeout_secs),
        }
    }

    /// Enabled rules as domain types
    pub fn to_rules(&self) -> Result<Vec<AlertRule>, ConfigError> {
        to_alert_rules(&self.rules)
    }

    /// Channels as domain types
    pub fn to_channels(&self) -> Result<Vec<Channel>, ConfigError> {
        to_channels(&self.channels)
    }

    /// Validate the whole configuration
    ///
    /// Returns warnings for problems that only surface at runtime, such as
    /// rules naming a channel that is not configured.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let positive = [
            ("general.check_interval_secs", self.general.check_interval_secs),
            ("general.sample_interval_secs", self.general.sample_interval_secs),
            ("notification.max_attempts", u64::from(self.notification.max_attempts)),
            ("notification.timeout_secs", self.notification.timeout_secs),
            ("gateway.send_timeout_ms", self.gateway.send_timeout_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.general.staleness_secs < self.general.sample_interval_secs {
            return Err(ConfigError::InvalidValue {
                key: "general.staleness_secs".to_string(),
                message: format!(
                    "must be at least the sample interval ({}s)",
                    self.general.sample_interval_secs
                ),
            });
        }

        let channels = self.to_channels()?;
        let rules = self.to_rules()?;

        let known: HashSet<&str> = channels.iter().map(|c| c.id.as_str()).collect();
        let mut warnings = Vec::new();
        for rule in &rules {
            if rule.channels.is_empty() {
                warnings.push(format!("Rule '{}' has no notification channels", rule.id));
            }
            for channel in rule.channels.iter().filter(|c| !known.contains(c.as_str())) {
                warnings.push(format!(
                    "Rule '{}' references unknown channel '{}'",
                    rule.id, channel
                ));
            }
        }

        Ok(warnings)
    }
}
