//! Channel adapter
//!
//! Delivers one payload to one destination with bounded retry. Every
//! attempt, including the final one, is handed to an [`AttemptSink`]
//! before `deliver` returns.

use super::payload::AlertPayload;
use super::transport::ChannelTransport;
use crate::alerts::AlertLifecycleManager;
use crate::domain::{Channel, NotificationAttempt};
use crate::error::TransportError;
use crate::shutdown::Shutdown;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Classified result of a single send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Destination accepted the payload
    Delivered,
    /// Failure that may succeed on a later attempt
    Retryable(String),
    /// Failure that will not succeed on retry
    Terminal(String),
}

impl SendOutcome {
    /// Classify a transport result
    ///
    /// 2xx is delivered; 408, 429, 5xx, timeouts and network errors are
    /// retryable; everything else is terminal.
    pub fn classify(result: Result<u16, TransportError>) -> Self {
        match result {
            Ok(status) if (200..300).contains(&status) => Self::Delivered,
            Ok(status) if status == 408 || status == 429 || status >= 500 => {
                Self::Retryable(format!("HTTP {}", status))
            }
            Ok(status) => Self::Terminal(format!("HTTP {}", status)),
            Err(e @ TransportError::InvalidRequest(_)) => Self::Terminal(e.to_string()),
            Err(e) => Self::Retryable(e.to_string()),
        }
    }
}

/// Retry and timeout policy shared by all channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Maximum attempts per dispatch, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry
    pub backoff_base: Duration,
    /// Bound on a single send
    pub timeout: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

impl DeliveryPolicy {
    /// Delay before retry number `retry` (0 for the first retry)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Receiver of delivery attempt records
///
/// The sink owns attempt numbering: the stored record carries the next
/// index for its (alert, channel) pair, whatever index it arrived with.
pub trait AttemptSink: Send + Sync {
    /// Append an attempt for an alert and return the stored record
    fn record(&self, alert_id: &str, attempt: NotificationAttempt) -> NotificationAttempt;
}

impl AttemptSink for AlertLifecycleManager {
    fn record(&self, alert_id: &str, attempt: NotificationAttempt) -> NotificationAttempt {
        match self.record_attempt(alert_id, attempt.clone()) {
            Some(stored) => stored,
            None => attempt,
        }
    }
}

/// Delivery to one configured channel
pub struct ChannelAdapter {
    channel: Channel,
    transport: Arc<dyn ChannelTransport>,
    policy: DeliveryPolicy,
}

impl ChannelAdapter {
    /// Create an adapter
    pub fn new(channel: Channel, transport: Arc<dyn ChannelTransport>, policy: DeliveryPolicy) -> Self {
        Self {
            channel,
            transport,
            policy,
        }
    }

    /// Channel configuration
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Deliver a payload, retrying retryable failures
    ///
    /// Every attempt is tagged with `dispatch`. Returns the terminal attempt
    /// as recorded by `sink`.
    pub async fn deliver(
        &self,
        alert_id: &str,
        dispatch: u32,
        payload: &AlertPayload,
        sink: &dyn AttemptSink,
        shutdown: &Shutdown,
    ) -> NotificationAttempt {
        let id = self.channel.id.as_str();
        let body = payload.render(self.channel.effective_kind());
        let max_attempts = self.policy.max_attempts.max(1);
        let mut stop = shutdown.clone();

        let mut attempt = 1;
        loop {
            if stop.is_triggered() {
                log::debug!("Channel '{}': delivery for {} cancelled", id, alert_id);
                let record =
                    NotificationAttempt::failed(id, attempt, "cancelled", true).in_dispatch(dispatch);
                return sink.record(alert_id, record);
            }

            let outcome = self.send_once(&body).await;
            let record = match outcome {
                SendOutcome::Delivered => {
                    log::info!("Channel '{}': delivered {} (attempt {})", id, alert_id, attempt);
                    NotificationAttempt::delivered(id, attempt)
                }
                SendOutcome::Terminal(error) => {
                    log::warn!("Channel '{}': delivery for {} failed: {}", id, alert_id, error);
                    NotificationAttempt::failed(id, attempt, error, true)
                }
                SendOutcome::Retryable(error) if attempt >= max_attempts => {
                    log::warn!(
                        "Channel '{}': giving up on {} after {} attempts: {}",
                        id,
                        alert_id,
                        attempt,
                        error
                    );
                    NotificationAttempt::failed(id, attempt, error, true)
                }
                SendOutcome::Retryable(error) => {
                    let delay = self.policy.backoff(attempt - 1);
                    log::debug!(
                        "Channel '{}': attempt {} for {} failed ({}), retrying in {:?}",
                        id,
                        attempt,
                        alert_id,
                        error,
                        delay
                    );
                    sink.record(
                        alert_id,
                        NotificationAttempt::failed(id, attempt, error, false).in_dispatch(dispatch),
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stop.wait() => {}
                    }
                    attempt += 1;
                    continue;
                }
            };

            return sink.record(alert_id, record.in_dispatch(dispatch));
        }
    }

    async fn send_once(&self, body: &serde_json::Value) -> SendOutcome {
        let timeout = self.policy.timeout;
        let send = self
            .transport
            .send(&self.channel.endpoint, body, &self.channel.headers, timeout);

        match tokio::time::timeout(timeout, AssertUnwindSafe(send).catch_unwind()).await {
            Err(_) => SendOutcome::Retryable(TransportError::Timeout(timeout).to_string()),
            Ok(Err(_)) => SendOutcome::Terminal("transport panicked".to_string()),
            Ok(Ok(result)) => SendOutcome::classify(result),
        }
    }
}
