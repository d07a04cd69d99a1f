//! Alert engine
//!
//! Wires the components together and runs the evaluation tick:
//! refresh rules, evaluate every new sample against matching rules, apply
//! breach/clear signals and hand each transition to the dispatcher, then
//! send due reminders. The engine task is the only owner of the evaluator.

use super::dispatcher::AlertDispatcher;
use super::feed::MetricFeed;
use crate::alerts::{
    AckOutcome, AlertLifecycleManager, AlertStats, BreachOutcome, HistoryFilter, RuleCache,
    RuleEvaluator, RuleStore, Signal,
};
use crate::bus::EventBus;
use crate::config::Config;
use crate::domain::{AlertInstance, MetricSample};
use crate::error::{AppError, ConfigError};
use crate::gateway::SubscriptionGateway;
use crate::notify::{ChannelTransport, NotificationKind, NotificationRouter};
use crate::shutdown::Shutdown;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Rules were unavailable and the tick was skipped
    pub skipped: bool,
    /// Samples processed
    pub samples: usize,
    /// New alerts
    pub triggered: usize,
    /// Recovered alerts
    pub recovered: usize,
    /// Samples rejected by a rule
    pub errors: usize,
    /// Reminder dispatches started
    pub reminders: usize,
}

/// The running alerting core
pub struct AlertEngine {
    tick_interval: Duration,
    store: Arc<dyn RuleStore>,
    rules: Arc<RuleCache>,
    evaluator: RuleEvaluator,
    bus: EventBus,
    lifecycle: Arc<AlertLifecycleManager>,
    gateway: Arc<SubscriptionGateway>,
    dispatcher: Arc<AlertDispatcher>,
}

impl AlertEngine {
    /// Build the engine and attach the gateway to the bus
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: &Config,
        store: Arc<dyn RuleStore>,
        transport: Arc<dyn ChannelTransport>,
        shutdown: Shutdown,
    ) -> Result<Self, ConfigError> {
        let channels = config.to_channels()?;

        let bus = EventBus::new(config.bus_config());
        let lifecycle = Arc::new(AlertLifecycleManager::new(
            config.lifecycle_config(),
            bus.clone(),
        ));
        let rules = Arc::new(RuleCache::new());

        let router = Arc::new(NotificationRouter::new(
            channels,
            transport,
            config.delivery_policy(),
            lifecycle.clone(),
            shutdown,
        ));
        let dispatcher = Arc::new(AlertDispatcher::new(
            lifecycle.clone(),
            router,
            rules.clone(),
            bus.clone(),
            config.notification.notify_on_recovery,
        ));

        let gateway = Arc::new(SubscriptionGateway::new(
            config.gateway_config(),
            lifecycle.clone(),
        ));
        gateway.attach(&bus);

        Ok(Self {
            tick_interval: config.check_interval(),
            store,
            rules,
            evaluator: RuleEvaluator::new(config.evaluator_config()),
            bus,
            lifecycle,
            gateway,
            dispatcher,
        })
    }

    /// Run one evaluation tick over `samples`
    pub async fn tick(&mut self, samples: &[MetricSample], now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            samples: samples.len(),
            ..TickReport::default()
        };

        let rules = match self.store.list().await {
            Ok(rules) => rules,
            Err(e) => {
                log::warn!("Skipping tick, rules unavailable: {}", e);
                report.skipped = true;
                return report;
            }
        };
        self.rules.update(&rules);
        self.evaluator.retain_rules(rules.iter().map(|r| r.id.as_str()));

        for sample in samples {
            for rule in rules
                .iter()
                .filter(|r| r.enabled && r.metric == sample.metric)
            {
                let live = self.lifecycle.has_live_alert(&rule.id);
                match self.evaluator.evaluate(rule, sample, live) {
                    Ok(Signal::Breach) => {
                        if let BreachOutcome::Triggered(alert) =
                            self.lifecycle.on_breach(rule, sample.value, sample.timestamp)
                        {
                            report.triggered += 1;
                            self.dispatcher
                                .notify(&alert.id, NotificationKind::Triggered, now);
                        }
                    }
                    Ok(Signal::Clear) => {
                        if let Some(alert) = self.lifecycle.on_clear(&rule.id, sample.timestamp) {
                            report.recovered += 1;
                            self.dispatcher
                                .notify(&alert.id, NotificationKind::Recovered, now);
                        }
                    }
                    Ok(Signal::None) => {}
                    Err(e) => {
                        log::warn!("Skipping sample: {}", e);
                        report.errors += 1;
                    }
                }
            }
        }

        report.reminders = self.dispatcher.send_reminders(now);

        if report.samples > 0 {
            log::debug!("Tick: {:?}", report);
        }
        report
    }

    /// Poll `feed` every tick until it ends or `shutdown` fires
    ///
    /// In-flight dispatches are drained before returning.
    pub async fn run(
        &mut self,
        feed: &mut dyn MetricFeed,
        mut shutdown: Shutdown,
    ) -> Result<(), AppError> {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!("Alert engine started (tick every {:?})", self.tick_interval);
        let result = loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.wait() => {
                    log::info!("Stop requested");
                    break Ok(());
                }
            }

            let (samples, ended) = match feed.poll().await {
                Ok(Some(samples)) => (samples, false),
                Ok(None) => (Vec::new(), true),
                Err(e) => break Err(AppError::from(e)),
            };

            self.tick(&samples, Utc::now()).await;

            if ended {
                log::info!("Metric feed ended");
                break Ok(());
            }
        };

        self.settle().await;
        log::info!("Alert engine stopped");
        result
    }

    /// Wait until published events are handled and dispatches finished
    pub async fn settle(&self) {
        self.bus.flush().await;
        self.dispatcher.drain().await;
    }

    /// Event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Lifecycle manager
    pub fn lifecycle(&self) -> &Arc<AlertLifecycleManager> {
        &self.lifecycle
    }

    /// Subscription gateway
    pub fn gateway(&self) -> &Arc<SubscriptionGateway> {
        &self.gateway
    }

    /// Dispatcher
    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    /// Non-recovered alerts
    pub fn active_alerts(&self) -> Vec<AlertInstance> {
        self.lifecycle.active_alerts()
    }

    /// Alert history query
    pub fn history(&self, filter: &HistoryFilter, limit: usize, offset: usize) -> Vec<AlertInstance> {
        self.lifecycle.history(filter, limit, offset)
    }

    /// Aggregate counts
    pub fn stats(&self) -> AlertStats {
        self.lifecycle.stats(Utc::now())
    }

    /// Acknowledge an alert
    pub fn acknowledge(&self, alert_id: &str, user: &str) -> Result<AlertInstance, AppError> {
        match self.lifecycle.acknowledge(alert_id, user) {
            AckOutcome::Acknowledged(alert) | AckOutcome::Unchanged(alert) => Ok(alert),
            AckOutcome::NotFound => Err(AppError::AlertNotFound(alert_id.to_string())),
        }
    }
}
