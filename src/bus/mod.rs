//! In-process event bus
//!
//! Publishers never wait on subscribers: every subscriber owns a bounded
//! queue drained by its own worker task, and `publish` only enqueues.
//! A bounded replay buffer keeps the most recent events regardless of topic.

mod event;

pub use event::{Event, EventFilter, EventType};

use crate::error::HandlerError;
use crate::sync::{lock, read, write};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

/// Subscriber handle returned by [`EventBus::subscribe`]
pub type SubscriberId = u64;

/// Event subscriber
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Handle one event
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Adapter running a synchronous callback on the subscriber's worker
struct FnHandler<F> {
    name: String,
    callback: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.callback)(event)
    }
}

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Number of events kept for replay
    pub history_capacity: usize,
    /// Per-subscriber queue length
    pub queue_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            queue_capacity: 256,
        }
    }
}

struct Subscription {
    name: String,
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
    /// Events queued or being handled
    pending: Arc<AtomicUsize>,
}

struct BusInner {
    config: EventBusConfig,
    subscribers: RwLock<HashMap<SubscriberId, Subscription>>,
    history: Mutex<VecDeque<Event>>,
    next_id: AtomicU64,
    idle: Arc<Notify>,
}

/// In-process publish/subscribe bus
///
/// Cheap to clone; all clones share subscribers and history.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(config: EventBusConfig) -> Self {
        let history = VecDeque::with_capacity(config.history_capacity);
        Self {
            inner: Arc::new(BusInner {
                config,
                subscribers: RwLock::new(HashMap::new()),
                history: Mutex::new(history),
                next_id: AtomicU64::new(1),
                idle: Arc::new(Notify::new()),
            }),
        }
    }

    /// Publish an event to the replay buffer and every matching subscriber
    pub fn publish(&self, event: Event) {
        let capacity = self.inner.config.history_capacity;
        if capacity > 0 {
            let mut history = lock(&self.inner.history);
            while history.len() >= capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let mut closed = Vec::new();
        {
            let subscribers = read(&self.inner.subscribers);
            for (id, sub) in subscribers.iter() {
                if !sub.filter.matches(event.event_type) {
                    continue;
                }
                sub.pending.fetch_add(1, Ordering::AcqRel);
                let sent = sub.tx.try_send(event.clone());
                if sent.is_err() {
                    sub.pending.fetch_sub(1, Ordering::AcqRel);
                }
                match sent {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log::warn!(
                            "Subscriber '{}' queue full, dropping {} event",
                            sub.name,
                            event.event_type
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = write(&self.inner.subscribers);
            for id in closed {
                if let Some(sub) = subscribers.remove(&id) {
                    log::debug!("Removed closed subscriber '{}'", sub.name);
                }
            }
        }
    }

    /// Register a handler and start its worker
    ///
    /// Must be called within a tokio runtime.
    pub fn subscribe(&self, filter: EventFilter, handler: Arc<dyn EventHandler>) -> SubscriberId {
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = handler.name().to_string();
        let pending = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_worker(
            handler,
            rx,
            Arc::clone(&pending),
            Arc::clone(&self.inner.idle),
        ));

        write(&self.inner.subscribers).insert(
            id,
            Subscription {
                name,
                filter,
                tx,
                pending,
            },
        );
        log::debug!("Subscriber {} registered", id);
        id
    }

    /// Register a synchronous callback
    pub fn subscribe_fn<F>(&self, name: &str, filter: EventFilter, callback: F) -> SubscriberId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(
            filter,
            Arc::new(FnHandler {
                name: name.to_string(),
                callback,
            }),
        )
    }

    /// Remove a subscriber; queued events are still drained by its worker
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        write(&self.inner.subscribers).remove(&id).is_some()
    }

    /// Most recent `limit` retained events, optionally of one type, oldest first
    pub fn history(&self, filter_type: Option<EventType>, limit: usize) -> Vec<Event> {
        let history = lock(&self.inner.history);
        let mut events: Vec<Event> = history
            .iter()
            .rev()
            .filter(|e| filter_type.map_or(true, |t| e.event_type == t))
            .take(limit)
            .cloned()
            .collect();
        events.reverse();
        events
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        read(&self.inner.subscribers).len()
    }

    /// Wait until every registered subscriber has handled its queued events
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let busy = read(&self.inner.subscribers)
                .values()
                .any(|s| s.pending.load(Ordering::Acquire) > 0);
            if !busy {
                return;
            }
            notified.await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

/// Drain one subscriber's queue, isolating failures per event
async fn run_worker(
    handler: Arc<dyn EventHandler>,
    mut rx: mpsc::Receiver<Event>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
) {
    while let Some(event) = rx.recv().await {
        let event_type = event.event_type;
        let worker = Arc::clone(&handler);
        let outcome = tokio::spawn(async move { worker.handle(&event).await }).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("{} on {}", e, event_type),
            Err(e) => log::error!(
                "Subscriber '{}' panicked on {}: {}",
                handler.name(),
                event_type,
                e
            ),
        }

        if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            idle.notify_waiters();
        }
    }
    log::debug!("Subscriber '{}' worker stopped", handler.name());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingHandler;
    use serde_json::json;
    use std::time::Duration;

    fn event(n: u64) -> Event {
        Event::new(EventType::AlertTriggered, json!({ "n": n }))
    }

    fn bus(history_capacity: usize) -> EventBus {
        EventBus::new(EventBusConfig {
            history_capacity,
            queue_capacity: 16,
        })
    }

    #[tokio::test]
    async fn test_history_is_fifo_bounded() {
        let bus = bus(3);
        for n in 0..4 {
            bus.publish(event(n));
        }

        let history = bus.history(None, 10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].payload["n"], 1);
        assert_eq!(history[2].payload["n"], 3);
        assert!(history.iter().all(|e| e.payload["n"] != 0));
    }

    #[tokio::test]
    async fn test_history_filter_and_limit() {
        let bus = bus(10);
        bus.publish(event(1));
        bus.publish(Event::new(EventType::AlertRecovered, json!({ "n": 2 })));
        bus.publish(event(3));
        bus.publish(event(4));

        let triggered = bus.history(Some(EventType::AlertTriggered), 2);
        assert_eq!(triggered.len(), 2);
        assert_eq!(triggered[0].payload["n"], 3);
        assert_eq!(triggered[1].payload["n"], 4);

        let recovered = bus.history(Some(EventType::AlertRecovered), 10);
        assert_eq!(recovered.len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_publish_order() {
        let bus = bus(10);
        let (handler, mut rx) = RecordingHandler::new("recorder");
        bus.subscribe(EventFilter::all(), handler);

        for n in 0..5 {
            bus.publish(event(n));
        }

        for n in 0..5 {
            let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.payload["n"], n);
        }
    }

    #[tokio::test]
    async fn test_filtered_subscriber() {
        let bus = bus(10);
        let (handler, mut rx) = RecordingHandler::new("recovered-only");
        bus.subscribe(EventFilter::only([EventType::AlertRecovered]), handler);

        bus.publish(event(1));
        bus.publish(Event::new(EventType::AlertRecovered, json!({ "n": 2 })));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type, EventType::AlertRecovered);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_are_isolated() {
        let bus = bus(10);
        bus.subscribe_fn("failing", EventFilter::all(), |_| {
            Err(HandlerError::new("failing", "nope"))
        });
        bus.subscribe_fn("panicking", EventFilter::all(), |_| panic!("boom"));
        let (handler, mut rx) = RecordingHandler::new("healthy");
        bus.subscribe(EventFilter::all(), handler);

        bus.publish(event(1));
        bus.publish(event(2));

        for n in 1..=2 {
            let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.payload["n"], n);
        }
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn test_wedged_subscriber_does_not_block_publisher() {
        let bus = EventBus::new(EventBusConfig {
            history_capacity: 10,
            queue_capacity: 1,
        });
        bus.subscribe_fn("wedged", EventFilter::all(), |_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        });

        let started = std::time::Instant::now();
        for n in 0..50 {
            bus.publish(event(n));
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(bus.history(None, 100).len(), 10);
    }

    #[tokio::test]
    async fn test_flush_waits_for_handlers() {
        let bus = bus(10);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe_fn("counter", EventFilter::all(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        for n in 0..5 {
            bus.publish(event(n));
        }
        tokio::time::timeout(Duration::from_secs(1), bus.flush())
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = bus(10);
        let (handler, mut rx) = RecordingHandler::new("recorder");
        let id = bus.subscribe(EventFilter::all(), handler);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(event(1));

        // Worker exits once the sender is dropped
        assert!(tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .is_none());
    }
}
