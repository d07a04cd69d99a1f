//! Alert dispatcher
//!
//! Bridges lifecycle transitions to the notification router. The engine
//! calls [`AlertDispatcher::notify`] directly for every trigger and
//! recovery it applies, so a notification never depends on a bus queue
//! having room. Triggered alerts and periodic reminders pass the lifecycle
//! silence gate before a dispatch task is spawned; recoveries are announced
//! only for alerts that were announced in the first place. Dispatch tasks
//! only append attempt records and publish a `notification:dispatched`
//! event when they finish.

use crate::alerts::{AlertLifecycleManager, RuleCache};
use crate::bus::{Event, EventBus, EventType};
use crate::notify::{NotificationKind, NotificationRouter};
use crate::sync::lock;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Alert dispatcher
pub struct AlertDispatcher {
    lifecycle: Arc<AlertLifecycleManager>,
    router: Arc<NotificationRouter>,
    rules: Arc<RuleCache>,
    bus: EventBus,
    notify_on_recovery: bool,
    tasks: Mutex<JoinSet<()>>,
}

impl AlertDispatcher {
    /// Create a dispatcher
    pub fn new(
        lifecycle: Arc<AlertLifecycleManager>,
        router: Arc<NotificationRouter>,
        rules: Arc<RuleCache>,
        bus: EventBus,
        notify_on_recovery: bool,
    ) -> Self {
        Self {
            lifecycle,
            router,
            rules,
            bus,
            notify_on_recovery,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Start a dispatch for an alert if its rule and silence window allow it
    ///
    /// Returns whether a dispatch task was spawned.
    pub fn notify(&self, alert_id: &str, kind: NotificationKind, now: DateTime<Utc>) -> bool {
        let Some(current) = self.lifecycle.get(alert_id) else {
            log::debug!("Skipping {} notification for unknown alert {}", kind, alert_id);
            return false;
        };
        let Some(rule) = self.rules.get(&current.rule_id) else {
            log::info!(
                "Skipping {} notification for alert {}: rule '{}' no longer exists",
                kind,
                alert_id,
                current.rule_id
            );
            return false;
        };

        let alert = match kind {
            NotificationKind::Triggered | NotificationKind::Reminder => {
                match self.lifecycle.begin_dispatch(alert_id, rule.silence, now) {
                    Some(alert) => alert,
                    None => return false,
                }
            }
            NotificationKind::Recovered => {
                if !self.notify_on_recovery {
                    return false;
                }
                match self.lifecycle.begin_recovery_dispatch(alert_id) {
                    Some(alert) => alert,
                    None => return false,
                }
            }
        };

        if rule.channels.is_empty() {
            log::debug!("Rule '{}' has no channels, nothing to notify", rule.id);
            return false;
        }

        let router = Arc::clone(&self.router);
        let bus = self.bus.clone();
        let mut tasks = lock(&self.tasks);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let results = router.dispatch(&alert, &rule, kind).await;
            bus.publish(Event::new(
                EventType::NotificationDispatched,
                json!({
                    "alert_id": alert.id,
                    "rule_id": alert.rule_id,
                    "kind": kind,
                    "results": results,
                }),
            ));
        });
        true
    }

    /// Re-notify triggered alerts whose silence window elapsed
    pub fn send_reminders(&self, now: DateTime<Utc>) -> usize {
        let due = self.lifecycle.due_reminders(&self.rules.snapshot(), now);
        due.iter()
            .filter(|alert| self.notify(&alert.id, NotificationKind::Reminder, now))
            .count()
    }

    /// Number of dispatch tasks not yet reaped
    pub fn in_flight(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Wait for every spawned dispatch task to finish
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.tasks));
            if tasks.is_empty() {
                break;
            }
            log::debug!("Waiting for {} dispatch tasks", tasks.len());
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    log::error!("Dispatch task failed: {}", e);
                }
            }
        }
    }
}
