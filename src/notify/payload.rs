//! Notification payloads
//!
//! Every notification is built from one [`AlertPayload`] and then shaped for
//! the destination's webhook format.

use crate::domain::{AlertInstance, AlertSeverity, WebhookKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Why a notification is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// First announcement of a new alert
    Triggered,
    /// Periodic reminder for an alert still open after its silence window
    Reminder,
    /// The alert recovered
    Recovered,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triggered => write!(f, "triggered"),
            Self::Reminder => write!(f, "reminder"),
            Self::Recovered => write!(f, "recovered"),
        }
    }
}

/// Destination-independent notification content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Why the notification is sent
    pub event: NotificationKind,
    /// Alert instance ID
    pub alert_id: String,
    /// Rule ID
    pub rule_id: String,
    /// Rule name at trigger time
    pub rule_name: String,
    /// Alert severity
    pub level: AlertSeverity,
    /// Metric name
    pub metric: String,
    /// Comparison operator symbol
    pub comparison: String,
    /// Threshold value
    pub threshold: f64,
    /// Value that caused the trigger
    pub value: f64,
    /// Rendered alert message
    pub message: String,
    /// When the alert triggered
    pub triggered_at: DateTime<Utc>,
    /// When the alert recovered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<DateTime<Utc>>,
}

impl AlertPayload {
    /// Build the payload for an alert
    pub fn new(alert: &AlertInstance, event: NotificationKind) -> Self {
        Self {
            event,
            alert_id: alert.id.clone(),
            rule_id: alert.rule_id.clone(),
            rule_name: alert.rule_name.clone(),
            level: alert.severity,
            metric: alert.metric.to_string(),
            comparison: alert.comparison.symbol().to_string(),
            threshold: alert.threshold,
            value: alert.value,
            message: alert.message.clone(),
            triggered_at: alert.triggered_at,
            recovered_at: alert.recovered_at,
        }
    }

    /// One-line title, e.g. `[WARNING] High CPU triggered`
    pub fn title(&self) -> String {
        let status = match self.event {
            NotificationKind::Triggered => "triggered",
            NotificationKind::Reminder => "still firing",
            NotificationKind::Recovered => "recovered",
        };
        format!("[{}] {} {}", self.level, self.rule_name, status)
    }

    fn condition(&self) -> String {
        format!("{} {} {}", self.metric, self.comparison, self.threshold)
    }

    fn markdown(&self) -> String {
        let mut text = format!(
            "### {}\n\n- **Condition:** {}\n- **Value:** {:.2}\n- **Message:** {}\n- **Triggered:** {}",
            self.title(),
            self.condition(),
            self.value,
            self.message,
            self.triggered_at.to_rfc3339()
        );
        if let Some(recovered) = self.recovered_at {
            text.push_str(&format!("\n- **Recovered:** {}", recovered.to_rfc3339()));
        }
        text
    }

    fn plain(&self) -> String {
        let mut text = format!(
            "{}\nCondition: {}\nValue: {:.2}\nMessage: {}\nTriggered: {}",
            self.title(),
            self.condition(),
            self.value,
            self.message,
            self.triggered_at.to_rfc3339()
        );
        if let Some(recovered) = self.recovered_at {
            text.push_str(&format!("\nRecovered: {}", recovered.to_rfc3339()));
        }
        text
    }

    fn slack(&self) -> String {
        let mut text = format!(
            "*{}*\n{} (value {:.2})\n{}",
            self.title(),
            self.condition(),
            self.value,
            self.message
        );
        if let Some(recovered) = self.recovered_at {
            text.push_str(&format!("\nRecovered at {}", recovered.to_rfc3339()));
        }
        text
    }

    /// Shape the payload for a webhook format
    pub fn render(&self, kind: WebhookKind) -> Value {
        match kind {
            WebhookKind::Slack => json!({ "text": self.slack() }),
            WebhookKind::DingTalk => json!({
                "msgtype": "markdown",
                "markdown": {
                    "title": self.title(),
                    "text": self.markdown(),
                },
            }),
            WebhookKind::Feishu => json!({
                "msg_type": "text",
                "content": { "text": self.plain() },
            }),
            WebhookKind::Generic => json!(self),
        }
    }
}
