//! Notification router
//!
//! Fans one notification out to every channel a rule names. Channels are
//! delivered concurrently in their own tasks and never affect each other.

use super::channel::{AttemptSink, ChannelAdapter, DeliveryPolicy};
use super::payload::{AlertPayload, NotificationKind};
use super::transport::ChannelTransport;
use crate::domain::{AlertInstance, AlertRule, AttemptOutcome, Channel, NotificationAttempt};
use crate::shutdown::Shutdown;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Final outcome of one channel in a dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Channel id
    pub channel: String,
    /// Dispatch number on the alert
    pub dispatch: u32,
    /// Terminal outcome
    pub outcome: AttemptOutcome,
    /// Index of the terminal attempt for this alert and channel
    pub attempt: u32,
    /// Last error, if the channel failed
    pub error: Option<String>,
}

impl From<NotificationAttempt> for DispatchResult {
    fn from(attempt: NotificationAttempt) -> Self {
        Self {
            channel: attempt.channel,
            dispatch: attempt.dispatch,
            outcome: attempt.outcome,
            attempt: attempt.attempt,
            error: attempt.error,
        }
    }
}

enum Pending {
    Running(String, JoinHandle<NotificationAttempt>),
    Done(NotificationAttempt),
}

/// Routes notifications to channel adapters
pub struct NotificationRouter {
    adapters: HashMap<String, Arc<ChannelAdapter>>,
    sink: Arc<dyn AttemptSink>,
    shutdown: Shutdown,
}

impl NotificationRouter {
    /// Create a router over the configured channels
    pub fn new(
        channels: Vec<Channel>,
        transport: Arc<dyn ChannelTransport>,
        policy: DeliveryPolicy,
        sink: Arc<dyn AttemptSink>,
        shutdown: Shutdown,
    ) -> Self {
        let adapters = channels
            .into_iter()
            .map(|channel| {
                let id = channel.id.clone();
                let adapter = ChannelAdapter::new(channel, Arc::clone(&transport), policy.clone());
                (id, Arc::new(adapter))
            })
            .collect();

        Self {
            adapters,
            sink,
            shutdown,
        }
    }

    /// Configured channel ids, sorted
    pub fn channel_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Deliver a notification to every channel of `rule`
    ///
    /// Attempts are tagged with `alert.dispatches`, the number handed out
    /// by the lifecycle gate. Returns one result per distinct channel id,
    /// in rule order.
    pub async fn dispatch(
        &self,
        alert: &AlertInstance,
        rule: &AlertRule,
        kind: NotificationKind,
    ) -> Vec<DispatchResult> {
        let payload = AlertPayload::new(alert, kind);
        let dispatch = alert.dispatches;
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for channel_id in rule.channels.iter().filter(|c| seen.insert(c.as_str())) {
            let Some(adapter) = self.adapters.get(channel_id) else {
                log::warn!(
                    "Rule '{}' references unknown channel '{}'",
                    rule.id,
                    channel_id
                );
                let attempt =
                    NotificationAttempt::failed(channel_id.as_str(), 1, "unknown channel", true)
                        .in_dispatch(dispatch);
                pending.push(Pending::Done(self.sink.record(&alert.id, attempt)));
                continue;
            };

            let adapter = Arc::clone(adapter);
            let sink = Arc::clone(&self.sink);
            let shutdown = self.shutdown.clone();
            let payload = payload.clone();
            let alert_id = alert.id.clone();

            let handle = tokio::spawn(async move {
                adapter
                    .deliver(&alert_id, dispatch, &payload, sink.as_ref(), &shutdown)
                    .await
            });
            pending.push(Pending::Running(channel_id.clone(), handle));
        }

        let mut results = Vec::with_capacity(pending.len());
        for entry in pending {
            let result = match entry {
                Pending::Done(attempt) => attempt.into(),
                Pending::Running(channel_id, handle) => match handle.await {
                    Ok(attempt) => attempt.into(),
                    Err(e) => {
                        log::error!("Delivery task for channel '{}' failed: {}", channel_id, e);
                        DispatchResult {
                            channel: channel_id,
                            dispatch,
                            outcome: AttemptOutcome::Failed,
                            attempt: 0,
                            error: Some(e.to_string()),
                        }
                    }
                },
            };
            results.push(result);
        }

        let delivered = results
            .iter()
            .filter(|r| r.outcome == AttemptOutcome::Delivered)
            .count();
        log::info!(
            "Dispatched {} notification for alert {}: {}/{} channels delivered",
            kind,
            alert.id,
            delivered,
            results.len()
        );

        results
    }
}
