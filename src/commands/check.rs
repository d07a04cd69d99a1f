//! Check command implementation
//!
//! Validates the configuration and any separate rule file.

use super::LoadedConfig;
use crate::alerts::to_alert_rules;
use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, CheckReport};
use crate::error::{AppError, ConfigError, Result};

/// Build the validation report for a loaded configuration
pub fn check_config(loaded: &LoadedConfig) -> CheckReport {
    let mut report = CheckReport {
        source: loaded.source_label(),
        valid: false,
        rules: 0,
        channels: loaded.config.channels.len(),
        warnings: Vec::new(),
        error: None,
    };

    let result = loaded.config.validate().and_then(|warnings| {
        report.warnings = warnings;
        match loaded.rules_path() {
            Some(_) => {
                let (_, configs) = loaded
                    .rule_configs()
                    .map_err(|e| ConfigError::ParseError(e.to_string()))?;
                to_alert_rules(&configs).map(|rules| rules.len())
            }
            None => loaded.config.to_rules().map(|rules| rules.len()),
        }
    });

    match result {
        Ok(rules) => {
            report.valid = true;
            report.rules = rules;
        }
        Err(e) => report.error = Some(e.to_string()),
    }

    report
}

/// Execute the check command
///
/// Prints the report and fails when the configuration is invalid.
pub fn run_check(loaded: &LoadedConfig, format: OutputFormat) -> Result<()> {
    let report = check_config(loaded);
    print_output(&report, format)?;

    match report.error {
        Some(message) => Err(AppError::Config(ConfigError::ParseError(message))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_check_starter_config() {
        let loaded = LoadedConfig {
            config: Config::starter(),
            source: None,
        };
        let report = check_config(&loaded);
        assert!(report.valid);
        assert_eq!(report.rules, 4);
        assert_eq!(report.channels, 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_check_reports_invalid_rule() {
        let mut config = Config::starter();
        config.rules[0].severity = "loud".to_string();
        let loaded = LoadedConfig {
            config,
            source: None,
        };

        let report = check_config(&loaded);
        assert!(!report.valid);
        assert!(report.error.unwrap().contains("severity"));
    }

    #[test]
    fn test_check_reports_missing_rule_file() {
        let mut config = Config::starter();
        config.general.rules_file = Some("/nonexistent/rules.toml".into());
        let loaded = LoadedConfig {
            config,
            source: None,
        };

        let report = check_config(&loaded);
        assert!(!report.valid);
        assert!(report.error.is_some());
    }
}
