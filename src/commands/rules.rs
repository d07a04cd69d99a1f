//! Rules command implementation
//!
//! Lists the alert rules `run` would load.

use super::LoadedConfig;
use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, RuleEntry, RuleList};
use crate::error::Result;

/// Execute the rules command
pub fn run_rules(loaded: &LoadedConfig, format: OutputFormat) -> Result<()> {
    let (source, configs) = loaded.rule_configs()?;

    let rules = configs
        .iter()
        .map(|config| config.to_alert_rule().map(|rule| RuleEntry::from(&rule)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    print_output(&RuleList { source, rules }, format)?;
    Ok(())
}
