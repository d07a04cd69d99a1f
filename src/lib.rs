//! alertctl - metric-driven alerting library
//!
//! This library provides threshold rule evaluation with hold durations,
//! alert lifecycle tracking, webhook notification delivery with retries,
//! and live subscriptions to lifecycle events.
//!
//! # Modules
//!
//! - [`alerts`]: Rule configuration, evaluation, lifecycle and rule stores
//! - [`bus`]: In-process event bus
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`domain`]: Domain models with validation
//! - [`error`]: Error types
//! - [`gateway`]: Live subscription gateway
//! - [`notify`]: Notification routing and channel adapters
//! - [`services`]: Metric feeds, dispatcher and the engine loop
//! - [`shutdown`]: Cooperative stop signal

pub mod alerts;
pub mod bus;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod services;
pub mod shutdown;

pub(crate) mod sync;

#[cfg(test)]
pub mod mock;

pub use error::{AppError, Result};
