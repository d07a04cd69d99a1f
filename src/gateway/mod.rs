//! Subscription gateway
//!
//! Streams lifecycle events to live observers. A new connection first
//! receives an `init` snapshot of the active alerts and counts, and only
//! then becomes visible to broadcasts. Events stamped before the snapshot
//! was taken are already reflected in it and are not forwarded to that
//! connection, even when the bus delivers them late. A connection that
//! fails or times out on a send is marked dead and pruned at the start of
//! the next broadcast.

use crate::alerts::{AlertLifecycleManager, AlertStats};
use crate::bus::{Event, EventBus, EventFilter, EventHandler, SubscriberId};
use crate::domain::AlertInstance;
use crate::error::{HandlerError, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Connection handle
pub type ConnectionId = u64;

/// Message sent to a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMessage {
    /// Snapshot sent once on connect
    Init {
        active: Vec<AlertInstance>,
        stats: AlertStats,
    },
    /// A bus event
    Event(Event),
}

/// Outbound side of a live connection
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// Send one message
    async fn send(&self, message: GatewayMessage) -> Result<(), SinkError>;
}

#[async_trait]
impl ConnectionSink for mpsc::Sender<GatewayMessage> {
    async fn send(&self, message: GatewayMessage) -> Result<(), SinkError> {
        mpsc::Sender::send(self, message)
            .await
            .map_err(|_| SinkError::Closed)
    }
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bound on a single send to one connection
    pub send_timeout: Duration,
    /// Buffer length for stream-form subscriptions
    pub queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(1),
            queue_capacity: 64,
        }
    }
}

struct Connection {
    filter: EventFilter,
    sink: Arc<dyn ConnectionSink>,
    alive: AtomicBool,
    /// Snapshot time; older events are covered by `init`
    since: DateTime<Utc>,
}

impl Connection {
    fn wants(&self, event: &Event) -> bool {
        self.alive.load(Ordering::Acquire)
            && self.filter.matches(event.event_type)
            && event.timestamp >= self.since
    }
}

/// Registry of live observers
pub struct SubscriptionGateway {
    config: GatewayConfig,
    lifecycle: Arc<AlertLifecycleManager>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
    dead: AtomicUsize,
}

impl SubscriptionGateway {
    /// Create a gateway reading snapshots from `lifecycle`
    pub fn new(config: GatewayConfig, lifecycle: Arc<AlertLifecycleManager>) -> Self {
        Self {
            config,
            lifecycle,
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dead: AtomicUsize::new(0),
        }
    }

    /// Subscribe the gateway to every bus event
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriberId {
        bus.subscribe(EventFilter::all(), Arc::clone(self) as Arc<dyn EventHandler>)
    }

    /// Register a connection after sending it the `init` snapshot
    pub async fn connect(
        &self,
        filter: EventFilter,
        sink: Arc<dyn ConnectionSink>,
    ) -> Result<ConnectionId, SinkError> {
        // Holding the write lock keeps broadcasts out until registration
        let mut connections = self.connections.write().await;

        let since = Utc::now();
        let snapshot = GatewayMessage::Init {
            active: self.lifecycle.active_alerts(),
            stats: self.lifecycle.stats(since),
        };
        match tokio::time::timeout(self.config.send_timeout, sink.send(snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SinkError::Timeout),
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        connections.insert(
            id,
            Arc::new(Connection {
                filter,
                sink,
                alive: AtomicBool::new(true),
                since,
            }),
        );
        log::debug!("Gateway connection {} registered", id);
        Ok(id)
    }

    /// Stream-form subscription backed by a bounded channel
    pub async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> Result<(ConnectionId, mpsc::Receiver<GatewayMessage>), SinkError> {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let id = self.connect(filter, Arc::new(tx)).await?;
        Ok((id, rx))
    }

    /// Remove a connection
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id);
        if let Some(connection) = &removed {
            if !connection.alive.load(Ordering::Acquire) {
                self.dead.fetch_sub(1, Ordering::AcqRel);
            }
            log::debug!("Gateway connection {} disconnected", id);
        }
        removed.is_some()
    }

    /// Send an event to every live, matching connection
    pub async fn broadcast(&self, event: &Event) {
        if self.dead.load(Ordering::Acquire) > 0 {
            self.prune().await;
        }

        let connections = self.connections.read().await;
        let targets: Vec<(ConnectionId, Arc<Connection>)> = connections
            .iter()
            .filter(|(_, c)| c.wants(event))
            .map(|(id, c)| (*id, Arc::clone(c)))
            .collect();

        let timeout = self.config.send_timeout;
        let sends = targets.iter().map(|(id, connection)| {
            let message = GatewayMessage::Event(event.clone());
            async move {
                let result = tokio::time::timeout(timeout, connection.sink.send(message)).await;
                let error = match result {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => e,
                    Err(_) => SinkError::Timeout,
                };
                if connection.alive.swap(false, Ordering::AcqRel) {
                    self.dead.fetch_add(1, Ordering::AcqRel);
                    log::info!("Gateway connection {} marked dead: {}", id, error);
                }
            }
        });
        join_all(sends).await;
    }

    /// Number of registered connections, dead ones included until pruned
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn prune(&self) {
        let mut connections = self.connections.write().await;
        let before = connections.len();
        connections.retain(|_, c| c.alive.load(Ordering::Acquire));
        let pruned = before - connections.len();
        self.dead.fetch_sub(pruned, Ordering::AcqRel);
        log::debug!("Pruned {} dead gateway connections", pruned);
    }
}

#[async_trait]
impl EventHandler for SubscriptionGateway {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.broadcast(event).await;
        Ok(())
    }
}
