//! Domain models for alertctl
//!
//! This module contains all domain types with validation.
//! Types are validated on construction (fail-fast pattern).

pub mod channel;
pub mod instance;
pub mod rule;
pub mod sample;

pub use channel::{Channel, WebhookKind};
pub use instance::{next_attempt_index, AlertInstance, AlertState, AttemptOutcome, NotificationAttempt};
pub use rule::{AlertRule, AlertSeverity, Comparison};
pub use sample::{MetricSample, MetricType};
