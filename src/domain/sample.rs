//! Metric sample domain types
//!
//! Provides the validated metric name type and timestamped scalar samples.

use crate::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a measured metric (e.g. `cpu`, `memory`, `disk`)
///
/// Metric names are lower-cased on construction and may only contain
/// ASCII alphanumerics, `_`, `-` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetricType(String);

impl MetricType {
    /// Create a new metric type, validating the name
    pub fn new(name: impl AsRef<str>) -> Result<Self, DomainError> {
        let name = name.as_ref().trim().to_ascii_lowercase();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if !valid {
            return Err(DomainError::InvalidMetric(name));
        }

        Ok(Self(name))
    }

    /// Get the metric name
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MetricType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MetricType> for String {
    fn from(metric: MetricType) -> Self {
        metric.0
    }
}

/// A single timestamped measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric this sample belongs to
    #[serde(rename = "type")]
    pub metric: MetricType,
    /// Measured value
    pub value: f64,
    /// When the value was measured
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Create a new sample
    pub fn new(metric: MetricType, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric,
            value,
            timestamp,
        }
    }
}
