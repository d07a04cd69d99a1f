//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::config::{Config, ConfigFile};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
    source: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            source: None,
        }
    }

    /// Load configuration from an explicit file or the default locations
    ///
    /// A missing explicit file is an error; missing default files are not.
    pub fn with_file(mut self, path: Option<&Path>) -> Result<Self, ConfigError> {
        let loaded = match path {
            Some(path) => Some((path.to_path_buf(), ConfigFile::load(path)?)),
            None => ConfigFile::load_default(),
        };

        if let Some((path, config)) = loaded {
            self.config = config;
            self.source = Some(path);
        }

        Ok(self)
    }

    /// Override with CLI verbose flag
    pub fn with_verbose(mut self, verbose: Option<bool>) -> Self {
        if let Some(v) = verbose {
            self.config.general.verbose = v;
        }
        self
    }

    /// Override with CLI interval
    pub fn with_interval(mut self, interval: Option<u64>) -> Self {
        if let Some(i) = interval {
            self.config.general.check_interval_secs = i;
        }
        self
    }

    /// File the configuration was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Build the final configuration
    pub fn build(self) -> Config {
        self.config
    }

    /// Build the final configuration along with its source file
    pub fn build_with_source(self) -> (Config, Option<PathBuf>) {
        (self.config, self.source)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().build();
        assert!(!config.general.verbose);
        assert_eq!(config.general.check_interval_secs, 5);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_verbose(Some(true))
            .with_interval(Some(10))
            .build();

        assert!(config.general.verbose);
        assert_eq!(config.general.check_interval_secs, 10);
    }

    #[test]
    fn test_builder_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alertctl.toml");
        std::fs::write(&path, "[general]\ncheck_interval_secs = 2\n").unwrap();

        let builder = ConfigBuilder::new().with_file(Some(&path)).unwrap();
        assert_eq!(builder.source(), Some(path.as_path()));

        let (config, source) = builder.with_interval(None).build_with_source();
        assert_eq!(config.general.check_interval_secs, 2);
        assert_eq!(source, Some(path));
    }

    #[test]
    fn test_builder_missing_explicit_file() {
        let result = ConfigBuilder::new().with_file(Some(Path::new("/nonexistent/alertctl.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
