//! Mock implementations for testing
//!
//! Provides scripted transports, recording sinks and handlers, and a rule
//! store that is always unavailable.

use crate::alerts::RuleStore;
use crate::bus::{Event, EventHandler};
use crate::domain::{next_attempt_index, AlertRule, NotificationAttempt};
use crate::error::{HandlerError, StoreError, TransportError};
use crate::notify::{AttemptSink, ChannelTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One recorded transport call
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub endpoint: String,
    pub payload: Value,
    pub headers: BTreeMap<String, String>,
    pub at: tokio::time::Instant,
}

#[derive(Debug)]
enum Behavior {
    Script(VecDeque<Result<u16, TransportError>>),
    Hang,
    Panic,
}

enum Action {
    Respond(Result<u16, TransportError>),
    Hang,
    Panic,
}

/// Transport answering from per-endpoint scripts
///
/// Unscripted endpoints, and scripts that ran out, answer 200.
#[derive(Debug, Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<TransportCall>>,
}

impl MockTransport {
    /// Create a transport that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `endpoint` with `responses` in order
    pub fn script(self, endpoint: &str, responses: Vec<Result<u16, TransportError>>) -> Self {
        self.set(endpoint, Behavior::Script(responses.into()))
    }

    /// Never answer `endpoint`
    pub fn hang(self, endpoint: &str) -> Self {
        self.set(endpoint, Behavior::Hang)
    }

    /// Panic when sending to `endpoint`
    pub fn panic_on(self, endpoint: &str) -> Self {
        self.set(endpoint, Behavior::Panic)
    }

    fn set(self, endpoint: &str, behavior: Behavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), behavior);
        self
    }

    /// Calls made so far
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: &Value,
        headers: &BTreeMap<String, String>,
        _timeout: Duration,
    ) -> Result<u16, TransportError> {
        self.calls.lock().unwrap().push(TransportCall {
            endpoint: endpoint.to_string(),
            payload: payload.clone(),
            headers: headers.clone(),
            at: tokio::time::Instant::now(),
        });

        let action = match self.behaviors.lock().unwrap().get_mut(endpoint) {
            None => Action::Respond(Ok(200)),
            Some(Behavior::Script(responses)) => Action::Respond(responses.pop_front().unwrap_or(Ok(200))),
            Some(Behavior::Hang) => Action::Hang,
            Some(Behavior::Panic) => Action::Panic,
        };

        match action {
            Action::Respond(result) => result,
            Action::Hang => std::future::pending().await,
            Action::Panic => panic!("mock transport panic for {}", endpoint),
        }
    }
}

/// Attempt sink that keeps every record
#[derive(Debug, Default)]
pub struct MockSink {
    attempts: Mutex<Vec<(String, NotificationAttempt)>>,
}

impl MockSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(alert_id, attempt)` pairs in arrival order
    pub fn attempts(&self) -> Vec<(String, NotificationAttempt)> {
        self.attempts.lock().unwrap().clone()
    }
}

impl AttemptSink for MockSink {
    fn record(&self, alert_id: &str, mut attempt: NotificationAttempt) -> NotificationAttempt {
        let mut attempts = self.attempts.lock().unwrap();
        attempt.attempt = next_attempt_index(
            attempts
                .iter()
                .filter(|(id, _)| id == alert_id)
                .map(|(_, a)| (a.channel.as_str(), a.attempt)),
            &attempt.channel,
        );
        attempts.push((alert_id.to_string(), attempt.clone()));
        attempt
    }
}

/// Bus handler forwarding every event to a channel
pub struct RecordingHandler {
    name: String,
    tx: mpsc::UnboundedSender<Event>,
}

impl RecordingHandler {
    /// Create a handler and the receiver of its events
    pub fn new(name: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Self {
            name: name.to_string(),
            tx,
        });
        (handler, rx)
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.tx
            .send(event.clone())
            .map_err(|e| HandlerError::new(&self.name, e.to_string()))
    }
}

/// Rule store that is always unavailable
#[derive(Debug, Default)]
pub struct FailingRuleStore;

#[async_trait]
impl RuleStore for FailingRuleStore {
    async fn list(&self) -> Result<Vec<AlertRule>, StoreError> {
        Err(StoreError::Unavailable("mock store offline".to_string()))
    }
}
