//! Rule stores
//!
//! Rule definitions live outside the alerting core. The engine reads a fresh
//! snapshot every tick through [`RuleStore`] and keeps the last good snapshot
//! in a [`RuleCache`] for the notification path.

use super::config::RuleSet;
use crate::domain::AlertRule;
use crate::error::{ConfigError, StoreError};
use crate::sync::{read, write};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Source of alert rule definitions
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules, enabled or not
    async fn list(&self) -> Result<Vec<AlertRule>, StoreError>;

    /// One rule by id
    async fn get(&self, id: &str) -> Result<Option<AlertRule>, StoreError> {
        Ok(self.list().await?.into_iter().find(|r| r.id == id))
    }
}

/// In-memory rule store
#[derive(Debug, Default)]
pub struct StaticRuleStore {
    rules: RwLock<Vec<AlertRule>>,
}

impl StaticRuleStore {
    /// Create a store holding `rules`
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Replace the stored rules
    pub fn replace(&self, rules: Vec<AlertRule>) {
        *write(&self.rules) = rules;
    }
}

#[async_trait]
impl RuleStore for StaticRuleStore {
    async fn list(&self) -> Result<Vec<AlertRule>, StoreError> {
        Ok(read(&self.rules).clone())
    }
}

/// Rule store backed by the `[[rules]]` tables of a TOML file
///
/// The file is read on every call, so edits apply on the next tick.
#[derive(Debug, Clone)]
pub struct FileRuleStore {
    path: PathBuf,
}

impl FileRuleStore {
    /// Create a store reading `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path being read
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn list(&self) -> Result<Vec<AlertRule>, StoreError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", self.path.display(), e)))?;

        let set: RuleSet = toml::from_str(&contents).map_err(|e| {
            StoreError::InvalidRule(ConfigError::ParseError(format!(
                "{}: {}",
                self.path.display(),
                e
            )))
        })?;

        Ok(set.to_alert_rules()?)
    }
}

/// Last good rule snapshot, keyed by rule id
#[derive(Debug, Default)]
pub struct RuleCache {
    rules: RwLock<HashMap<String, AlertRule>>,
}

impl RuleCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot
    pub fn update(&self, rules: &[AlertRule]) {
        let snapshot = rules.iter().map(|r| (r.id.clone(), r.clone())).collect();
        *write(&self.rules) = snapshot;
    }

    /// Look up a rule
    pub fn get(&self, id: &str) -> Option<AlertRule> {
        read(&self.rules).get(id).cloned()
    }

    /// Copy of the whole snapshot
    pub fn snapshot(&self) -> HashMap<String, AlertRule> {
        read(&self.rules).clone()
    }

    /// Number of cached rules
    pub fn len(&self) -> usize {
        read(&self.rules).len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
