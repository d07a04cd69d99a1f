//! Terminal event printer
//!
//! Prints lifecycle events to stdout or stderr with coloured severity tags.
//! Attached to the bus by `alertctl run`.

use crate::bus::{Event, EventHandler, EventType};
use crate::domain::{AlertInstance, AlertSeverity};
use crate::error::HandlerError;
use async_trait::async_trait;
use std::io::{self, Write};

/// Terminal/console notifier
pub struct TerminalNotifier {
    /// Use stderr instead of stdout
    use_stderr: bool,
    /// Use colors (ANSI escape codes)
    use_colors: bool,
}

impl TerminalNotifier {
    /// Create a notifier writing to stderr
    pub fn new() -> Self {
        Self {
            use_stderr: true,
            use_colors: Self::supports_color(),
        }
    }

    /// Create a notifier that uses stdout
    pub fn stdout() -> Self {
        Self {
            use_stderr: false,
            use_colors: Self::supports_color(),
        }
    }

    /// Create a notifier without colors
    pub fn no_color() -> Self {
        Self {
            use_stderr: true,
            use_colors: false,
        }
    }

    fn supports_color() -> bool {
        std::env::var("TERM")
            .map(|term| term != "dumb")
            .unwrap_or(false)
            && std::env::var_os("NO_COLOR").is_none()
    }

    /// Render one event as a line of text
    pub fn format_event(&self, event: &Event) -> String {
        let time = event.timestamp.format("%H:%M:%S");

        match (event.event_type, event.alert()) {
            (EventType::NotificationDispatched, _) => {
                let alert_id = event.payload["alert_id"].as_str().unwrap_or("?");
                let summary = event.payload["results"]
                    .as_array()
                    .map(|results| {
                        results
                            .iter()
                            .map(|r| {
                                format!(
                                    "{}={}",
                                    r["channel"].as_str().unwrap_or("?"),
                                    r["outcome"].as_str().unwrap_or("?")
                                )
                            })
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                format!("[{}] NOTIFY {}: {}", time, alert_id, summary)
            }
            (event_type, Some(alert)) => {
                format!(
                    "[{}] {} {}",
                    time,
                    self.format_severity(alert.severity),
                    self.describe(event_type, &alert)
                )
            }
            (event_type, None) => format!("[{}] {}", time, event_type),
        }
    }

    fn describe(&self, event_type: EventType, alert: &AlertInstance) -> String {
        match event_type {
            EventType::AlertTriggered => format!("{} (alert {})", alert.message, alert.id),
            EventType::AlertAcknowledged => format!(
                "{} acknowledged by {} (alert {})",
                alert.rule_name,
                alert.acknowledged_by.as_deref().unwrap_or("unknown"),
                alert.id
            ),
            EventType::AlertRecovered => format!("{} recovered (alert {})", alert.rule_name, alert.id),
            EventType::NotificationDispatched => alert.id.clone(),
        }
    }

    /// Format severity with colors
    fn format_severity(&self, severity: AlertSeverity) -> String {
        if !self.use_colors {
            return format!("{}", severity);
        }

        let (color_code, text) = match severity {
            AlertSeverity::Info => ("\x1b[36m", "INFO"),                  // Cyan
            AlertSeverity::Warning => ("\x1b[33m", "WARNING"),            // Yellow
            AlertSeverity::Critical => ("\x1b[31m", "CRITICAL"),          // Red
            AlertSeverity::Emergency => ("\x1b[35m\x1b[1m", "EMERGENCY"), // Bold Magenta
        };

        format!("{}{}\x1b[0m", color_code, text)
    }
}

impl Default for TerminalNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for TerminalNotifier {
    fn name(&self) -> &str {
        "terminal"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let line = self.format_event(event);
        let result = if self.use_stderr {
            writeln!(io::stderr().lock(), "{}", line)
        } else {
            writeln!(io::stdout().lock(), "{}", line)
        };

        result.map_err(|e| HandlerError::new(self.name(), e.to_string()))
    }
}
