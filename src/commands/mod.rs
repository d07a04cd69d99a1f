//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command.

pub mod check;
pub mod init;
pub mod rules;
pub mod run;

pub use check::run_check;
pub use init::run_init;
pub use rules::run_rules;
pub use run::run_engine;

use crate::alerts::{AlertRuleConfig, RuleSet};
use crate::config::{Config, ConfigBuilder};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Configuration together with the file it was read from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: Option<PathBuf>,
}

impl LoadedConfig {
    /// Load from `path` or the default locations, applying CLI overrides
    pub fn load(path: Option<&Path>, verbose: bool, interval: Option<u64>) -> Result<Self> {
        let (config, source) = ConfigBuilder::new()
            .with_file(path)?
            .with_verbose(verbose.then_some(true))
            .with_interval(interval)
            .build_with_source();

        Ok(Self { config, source })
    }

    /// Where the configuration came from, for display
    pub fn source_label(&self) -> String {
        match &self.source {
            Some(path) => path.display().to_string(),
            None => "built-in defaults".to_string(),
        }
    }

    /// Separate rule file, resolved against the config file's directory
    pub fn rules_path(&self) -> Option<PathBuf> {
        let rules_file = self.config.general.rules_file.as_ref()?;
        if rules_file.is_absolute() {
            return Some(rules_file.clone());
        }

        let base = self.source.as_deref().and_then(Path::parent);
        Some(match base {
            Some(dir) => dir.join(rules_file),
            None => rules_file.clone(),
        })
    }

    /// Rule definitions in effect, including disabled ones
    pub fn rule_configs(&self) -> Result<(String, Vec<AlertRuleConfig>)> {
        match self.rules_path() {
            Some(path) => {
                let set = RuleSet::load(&path)?;
                Ok((path.display().to_string(), set.rules))
            }
            None => Ok((self.source_label(), self.config.rules.clone())),
        }
    }
}
