//! Configuration file loading
//!
//! Handles loading and writing configuration as TOML files.

use crate::config::Config;
use crate::error::ConfigError;

use std::path::{Path, PathBuf};

/// Configuration file handler
pub struct ConfigFile;

impl ConfigFile {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the first default location that parses
    pub fn load_default() -> Option<(PathBuf, Config)> {
        for path in Self::default_paths() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        return Some((path, config));
                    }
                    Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
                }
            }
        }
        None
    }

    /// Write configuration, refusing to overwrite unless `force` is set
    pub fn save<P: AsRef<Path>>(path: P, config: &Config, force: bool) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.display().to_string()));
        }

        let contents = toml::to_string_pretty(config)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Per-user configuration path
    pub fn user_path() -> PathBuf {
        match dirs::config_dir() {
            Some(config_dir) => config_dir.join("alertctl").join("config.toml"),
            None => PathBuf::from("alertctl.toml"),
        }
    }

    /// Get default configuration file paths
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System-wide config
        paths.push(PathBuf::from("/etc/alertctl/config.toml"));

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("alertctl").join("config.toml"));
        }

        // Current directory
        paths.push(PathBuf::from("alertctl.toml"));

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_not_empty() {
        let paths = ConfigFile::default_paths();
        assert!(!paths.is_empty());
        assert_eq!(paths.last().unwrap(), &PathBuf::from("alertctl.toml"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigFile::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::starter();

        ConfigFile::save(&path, &config, false).unwrap();
        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.rules, config.rules);
        assert_eq!(loaded.channels, config.channels);

        assert!(matches!(
            ConfigFile::save(&path, &config, false),
            Err(ConfigError::AlreadyExists(_))
        ));
        ConfigFile::save(&path, &Config::default(), true).unwrap();
        assert!(ConfigFile::load(&path).unwrap().rules.is_empty());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general\n").unwrap();
        assert!(matches!(ConfigFile::load(&path), Err(ConfigError::TomlError(_))));
    }
}
