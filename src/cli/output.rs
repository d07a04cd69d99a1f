//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::alerts::AlertStats;
use crate::cli::args::OutputFormat;
use crate::domain::AlertRule;
use serde::Serialize;
use std::io::{self, Write};

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
            writeln!(handle, "{}", json)?;
        }
        OutputFormat::Compact => {
            writeln!(handle, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().replace('\n', " | ")
    }
}

/// Rule entry for display
#[derive(Debug, Clone, Serialize)]
pub struct RuleEntry {
    pub id: String,
    pub name: String,
    pub condition: String,
    pub severity: String,
    pub duration_secs: u64,
    pub silence_secs: u64,
    pub channels: Vec<String>,
    pub enabled: bool,
}

impl From<&AlertRule> for RuleEntry {
    fn from(rule: &AlertRule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            condition: format!("{} {} {}", rule.metric, rule.comparison.symbol(), rule.threshold),
            severity: rule.severity.as_str().to_string(),
            duration_secs: rule.duration.as_secs(),
            silence_secs: rule.silence.as_secs(),
            channels: rule.channels.clone(),
            enabled: rule.enabled,
        }
    }
}

impl TableDisplay for RuleEntry {
    fn to_table(&self) -> String {
        let channels = if self.channels.is_empty() {
            "-".to_string()
        } else {
            self.channels.join(",")
        };
        format!(
            "  {:<16} {:<20} {:<10} {:>6}s {:>7}s  {:<12} {}",
            self.id,
            self.condition,
            self.severity,
            self.duration_secs,
            self.silence_secs,
            channels,
            if self.enabled { "yes" } else { "no" }
        )
    }

    fn to_compact(&self) -> String {
        format!("{}:{}", self.id, self.condition)
    }
}

/// Rule list for display
#[derive(Debug, Clone, Serialize)]
pub struct RuleList {
    pub source: String,
    pub rules: Vec<RuleEntry>,
}

impl TableDisplay for RuleList {
    fn to_table(&self) -> String {
        let mut output = format!("Rules from: {}\n", self.source);
        output.push_str(&format!("Rules Loaded: {}\n\n", self.rules.len()));

        if self.rules.is_empty() {
            output.push_str("  No rules configured\n");
            return output;
        }

        output.push_str(
            "  ID               Condition            Severity      Hold  Silence  Channels     Enabled\n",
        );
        output.push_str("  ─────────────────────────────────────────────────────────────────────────────────────\n");
        for rule in &self.rules {
            output.push_str(&rule.to_table());
            output.push('\n');
        }

        output
    }

    fn to_compact(&self) -> String {
        self.rules
            .iter()
            .map(|r| r.to_compact())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Result of validating a configuration
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub source: String,
    pub valid: bool,
    pub rules: usize,
    pub channels: usize,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl TableDisplay for CheckReport {
    fn to_table(&self) -> String {
        let mut output = format!("Configuration: {}\n", self.source);

        match &self.error {
            Some(error) => output.push_str(&format!("✗ Invalid: {}\n", error)),
            None => output.push_str(&format!(
                "✓ Valid ({} rules, {} channels)\n",
                self.rules, self.channels
            )),
        }

        for warning in &self.warnings {
            output.push_str(&format!("  ! {}\n", warning));
        }

        output
    }

    fn to_compact(&self) -> String {
        match &self.error {
            Some(error) => format!("invalid: {}", error),
            None => format!("valid: {} rules, {} warnings", self.rules, self.warnings.len()),
        }
    }
}

/// Alert statistics summary printed when `run` finishes
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub stats: AlertStats,
}

impl TableDisplay for RunSummary {
    fn to_table(&self) -> String {
        let mut output = format!(
            "Alerts: {} total, {} active\n",
            self.stats.total, self.stats.active
        );
        for (level, count) in &self.stats.by_level {
            output.push_str(&format!("  {:<10} {}\n", level.to_string(), count));
        }
        output.push_str(&format!(
            "Acknowledged today: {}\nRecovered today: {}",
            self.stats.acknowledged_today, self.stats.recovered_today
        ));
        output
    }

    fn to_compact(&self) -> String {
        format!("{} total, {} active", self.stats.total, self.stats.active)
    }
}

/// Simple message output
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
    pub success: bool,
}

impl TableDisplay for Message {
    fn to_table(&self) -> String {
        if self.success {
            format!("✓ {}", self.message)
        } else {
            format!("✗ {}", self.message)
        }
    }
}
