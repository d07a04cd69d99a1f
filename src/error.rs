//! Unified error types for alertctl
//!
//! This module defines all error types used throughout the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from domain type validation
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    /// Rule store could not be read
    #[error("Rule store error: {0}")]
    Store(#[from] StoreError),

    /// Metric feed failed
    #[error("Metric feed error: {0}")]
    Feed(#[from] FeedError),

    /// Notification transport could not be set up
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Alert not found by ID
    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from domain type validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Metric name is empty or contains unsupported characters
    #[error("Invalid metric type: '{0}'")]
    InvalidMetric(String),

    /// Unknown comparison operator
    #[error("Invalid comparison operator: '{0}' (expected gt, lt, eq, gte or lte)")]
    InvalidComparison(String),

    /// Unknown severity level
    #[error("Invalid severity level: '{0}'")]
    InvalidSeverity(String),

    /// Unknown webhook kind
    #[error("Invalid channel kind: '{0}' (expected slack, dingtalk, feishu or generic)")]
    InvalidChannelKind(String),

    /// Invalid value provided
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Failed to parse config file
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config file already exists and would be overwritten
    #[error("Configuration file already exists: {0} (use --force to overwrite)")]
    AlreadyExists(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A sample that cannot be evaluated against a rule
///
/// Skipped for the current tick only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Sample metric does not match the rule metric
    #[error("Metric mismatch for rule '{rule_id}': expected {expected}, got {actual}")]
    MetricMismatch {
        rule_id: String,
        expected: String,
        actual: String,
    },

    /// Sample value is NaN or infinite
    #[error("Malformed sample for metric {metric}: value {value} is not finite")]
    MalformedSample { metric: String, value: f64 },
}

/// Errors from the external rule store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be read this tick
    #[error("Rule store unavailable: {0}")]
    Unavailable(String),

    /// Stored rule failed validation
    #[error("Invalid rule definition: {0}")]
    InvalidRule(#[from] ConfigError),
}

/// Errors from a channel transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Send did not complete within the timeout
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection or protocol failure
    #[error("Network error: {0}")]
    Network(String),

    /// Payload could not be encoded
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors from the metric feed
#[derive(Error, Debug)]
pub enum FeedError {
    /// A sample line could not be decoded
    #[error("Failed to decode sample at line {line}: {message}")]
    Decode { line: usize, message: String },

    /// Reading from the source failed
    #[error("Feed read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned by an event bus handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Handler '{handler}' failed: {message}")]
pub struct HandlerError {
    pub handler: String,
    pub message: String,
}

impl HandlerError {
    /// Create a new handler error
    pub fn new(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Errors from sending to a live subscriber connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The connection is gone
    #[error("Connection closed")]
    Closed,

    /// The connection cannot keep up
    #[error("Connection send buffer full")]
    Full,

    /// Send did not complete in time
    #[error("Send timed out")]
    Timeout,
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
