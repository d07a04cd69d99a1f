//! Alert lifecycle manager
//!
//! Owns every alert instance and applies state transitions:
//!
//! ```text
//! INACTIVE --breach--> TRIGGERED --ack--> ACKNOWLEDGED
//!                          |                   |
//!                          +------clear--------+--> RECOVERED (terminal)
//! ```
//!
//! All mutation happens under one mutex, so an acknowledgment racing an
//! automatic recovery is applied in some serial order; once RECOVERED is
//! applied the instance is never changed again.

use crate::bus::{Event, EventBus, EventType};
use crate::domain::{AlertInstance, AlertRule, AlertSeverity, AlertState, NotificationAttempt};
use crate::sync::lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Lifecycle manager configuration
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Maximum number of recovered alerts to keep in history
    pub max_history: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { max_history: 1000 }
    }
}

/// Result of a breach signal
#[derive(Debug, Clone, PartialEq)]
pub enum BreachOutcome {
    /// A new instance was created
    Triggered(AlertInstance),
    /// The rule already had a live instance
    AlreadyLive(AlertInstance),
}

/// Result of an acknowledge request
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// The instance moved to ACKNOWLEDGED
    Acknowledged(AlertInstance),
    /// The instance was already acknowledged or recovered
    Unchanged(AlertInstance),
    /// No instance with that id is known
    NotFound,
}

/// History query filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    /// Only alerts of this rule
    pub rule_id: Option<String>,
    /// Only alerts of this severity
    pub level: Option<AlertSeverity>,
    /// Only alerts in this state
    pub status: Option<AlertState>,
    /// Triggered at or after
    pub from: Option<DateTime<Utc>>,
    /// Triggered before
    pub to: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn matches(&self, alert: &AlertInstance) -> bool {
        self.rule_id.as_ref().map_or(true, |id| *id == alert.rule_id)
            && self.level.map_or(true, |l| l == alert.severity)
            && self.status.map_or(true, |s| s == alert.state)
            && self.from.map_or(true, |from| alert.triggered_at >= from)
            && self.to.map_or(true, |to| alert.triggered_at < to)
    }
}

/// Aggregate counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    /// All known alerts (live and retained history)
    pub total: usize,
    /// Alerts not yet recovered
    pub active: usize,
    /// Active alerts per severity
    pub by_level: BTreeMap<AlertSeverity, usize>,
    /// Alerts acknowledged since UTC midnight
    pub acknowledged_today: usize,
    /// Alerts recovered since UTC midnight
    pub recovered_today: usize,
}

#[derive(Debug, Default)]
struct LifecycleState {
    /// Live instance per rule id
    live: HashMap<String, AlertInstance>,
    /// Recovered instances, oldest first
    history: VecDeque<AlertInstance>,
}

impl LifecycleState {
    fn find_mut(&mut self, alert_id: &str) -> Option<&mut AlertInstance> {
        if let Some(alert) = self.live.values_mut().find(|a| a.id == alert_id) {
            return Some(alert);
        }
        self.history.iter_mut().find(|a| a.id == alert_id)
    }
}

/// Alert lifecycle manager
pub struct AlertLifecycleManager {
    state: Mutex<LifecycleState>,
    bus: EventBus,
    config: LifecycleConfig,
}

impl AlertLifecycleManager {
    /// Create a new lifecycle manager publishing to `bus`
    pub fn new(config: LifecycleConfig, bus: EventBus) -> Self {
        Self {
            state: Mutex::new(LifecycleState::default()),
            bus,
            config,
        }
    }

    /// Apply a breach signal
    pub fn on_breach(&self, rule: &AlertRule, value: f64, now: DateTime<Utc>) -> BreachOutcome {
        let alert = {
            let mut state = lock(&self.state);
            if let Some(existing) = state.live.get(&rule.id) {
                log::debug!(
                    "Rule '{}' breached again while alert {} is {}",
                    rule.id,
                    existing.id,
                    existing.state
                );
                return BreachOutcome::AlreadyLive(existing.clone());
            }

            let alert = AlertInstance::triggered(rule, value, now);
            state.live.insert(rule.id.clone(), alert.clone());
            self.bus
                .publish(Event::for_alert(EventType::AlertTriggered, &alert));
            alert
        };

        log::info!(
            "[{}] {} triggered (alert {})",
            alert.severity,
            alert.rule_name,
            alert.id
        );
        BreachOutcome::Triggered(alert)
    }

    /// Apply a clear signal; returns the recovered instance
    pub fn on_clear(&self, rule_id: &str, now: DateTime<Utc>) -> Option<AlertInstance> {
        let alert = {
            let mut state = lock(&self.state);
            let mut alert = state.live.remove(rule_id)?;
            alert.recover(now);
            self.bus
                .publish(Event::for_alert(EventType::AlertRecovered, &alert));
            self.push_history(&mut state, alert.clone());
            alert
        };

        log::info!("{} recovered (alert {})", alert.rule_name, alert.id);
        Some(alert)
    }

    /// Acknowledge an alert by id
    pub fn acknowledge(&self, alert_id: &str, user: &str) -> AckOutcome {
        self.acknowledge_at(alert_id, user, Utc::now())
    }

    /// Acknowledge an alert by id at a given time
    pub fn acknowledge_at(&self, alert_id: &str, user: &str, now: DateTime<Utc>) -> AckOutcome {
        let mut state = lock(&self.state);
        let Some(alert) = state.find_mut(alert_id) else {
            log::info!("Acknowledge for unknown alert {}", alert_id);
            return AckOutcome::NotFound;
        };

        if alert.state != AlertState::Triggered {
            log::info!(
                "Acknowledge for alert {} ignored, already {}",
                alert_id,
                alert.state
            );
            return AckOutcome::Unchanged(alert.clone());
        }

        alert.acknowledge(user, now);
        let alert = alert.clone();
        self.bus
            .publish(Event::for_alert(EventType::AlertAcknowledged, &alert));
        log::info!("Alert {} acknowledged by {}", alert.id, user);
        AckOutcome::Acknowledged(alert)
    }

    /// Silence-window gate for a notification dispatch
    ///
    /// Admits the dispatch (and stamps `last_notified_at`) when the alert is
    /// live and either was never notified or the silence window elapsed. A
    /// zero window admits only the first dispatch.
    pub fn begin_dispatch(
        &self,
        alert_id: &str,
        silence: Duration,
        now: DateTime<Utc>,
    ) -> Option<AlertInstance> {
        let mut state = lock(&self.state);
        let alert = state.live.values_mut().find(|a| a.id == alert_id)?;

        if !silence_elapsed(alert.last_notified_at, silence, now) {
            log::debug!("Alert {} notification suppressed by silence window", alert_id);
            return None;
        }

        alert.last_notified_at = Some(now);
        alert.next_dispatch();
        Some(alert.clone())
    }

    /// Gate for the recovery notification of an alert
    ///
    /// Admits once, and only for a recovered alert that was notified while
    /// it was live.
    pub fn begin_recovery_dispatch(&self, alert_id: &str) -> Option<AlertInstance> {
        let mut state = lock(&self.state);
        let alert = state.history.iter_mut().find(|a| a.id == alert_id)?;

        if alert.state != AlertState::Recovered
            || alert.last_notified_at.is_none()
            || alert.recovery_notified
        {
            return None;
        }

        alert.recovery_notified = true;
        alert.next_dispatch();
        Some(alert.clone())
    }

    /// Triggered (unacknowledged) alerts whose silence window has elapsed
    pub fn due_reminders(
        &self,
        rules: &HashMap<String, AlertRule>,
        now: DateTime<Utc>,
    ) -> Vec<AlertInstance> {
        let state = lock(&self.state);
        state
            .live
            .values()
            .filter(|a| a.state == AlertState::Triggered && a.last_notified_at.is_some())
            .filter(|a| {
                rules
                    .get(&a.rule_id)
                    .is_some_and(|r| silence_elapsed(a.last_notified_at, r.silence, now))
            })
            .cloned()
            .collect()
    }

    /// Append a delivery attempt to an alert's notification log
    ///
    /// Returns the stored record, numbered after the last attempt on the
    /// same channel.
    pub fn record_attempt(
        &self,
        alert_id: &str,
        attempt: NotificationAttempt,
    ) -> Option<NotificationAttempt> {
        let mut state = lock(&self.state);
        match state.find_mut(alert_id) {
            Some(alert) => Some(alert.push_attempt(attempt)),
            None => {
                log::warn!(
                    "Dropping {} attempt for unknown alert {}",
                    attempt.channel,
                    alert_id
                );
                None
            }
        }
    }

    /// Whether a rule has a non-recovered alert
    pub fn has_live_alert(&self, rule_id: &str) -> bool {
        lock(&self.state).live.contains_key(rule_id)
    }

    /// Look up an alert by id
    pub fn get(&self, alert_id: &str) -> Option<AlertInstance> {
        lock(&self.state).find_mut(alert_id).map(|a| a.clone())
    }

    /// All non-recovered alerts, oldest trigger first
    pub fn active_alerts(&self) -> Vec<AlertInstance> {
        let state = lock(&self.state);
        let mut alerts: Vec<AlertInstance> = state.live.values().cloned().collect();
        alerts.sort_by_key(|a| a.triggered_at);
        alerts
    }

    /// Query live and retained alerts, newest trigger first
    pub fn history(&self, filter: &HistoryFilter, limit: usize, offset: usize) -> Vec<AlertInstance> {
        let state = lock(&self.state);
        let mut alerts: Vec<AlertInstance> = state
            .live
            .values()
            .chain(state.history.iter())
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        alerts.into_iter().skip(offset).take(limit).collect()
    }

    /// Aggregate counts as of `now`
    pub fn stats(&self, now: DateTime<Utc>) -> AlertStats {
        let state = lock(&self.state);
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let today = |t: Option<DateTime<Utc>>| t.is_some_and(|t| t >= midnight && t <= now);

        let mut stats = AlertStats {
            total: state.live.len() + state.history.len(),
            active: state.live.len(),
            ..AlertStats::default()
        };

        for alert in state.live.values() {
            *stats.by_level.entry(alert.severity).or_insert(0) += 1;
        }
        for alert in state.live.values().chain(state.history.iter()) {
            if today(alert.acknowledged_at) {
                stats.acknowledged_today += 1;
            }
            if today(alert.recovered_at) {
                stats.recovered_today += 1;
            }
        }

        stats
    }

    fn push_history(&self, state: &mut LifecycleState, alert: AlertInstance) {
        state.history.push_back(alert);

        // Trim history if needed
        while state.history.len() > self.config.max_history {
            state.history.pop_front();
        }
    }
}

fn silence_elapsed(last: Option<DateTime<Utc>>, silence: Duration, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(_) if silence.is_zero() => false,
        Some(last) => (now - last)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= silence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBusConfig;
    use crate::domain::{AttemptOutcome, Comparison, MetricType};
    use chrono::TimeZone;

    fn rule(id: &str) -> AlertRule {
        AlertRule::new(
            id,
            "High CPU",
            MetricType::new("cpu").unwrap(),
            Comparison::Gt,
            80.0,
            AlertSeverity::Warning,
        )
        .with_silence(Duration::from_secs(30 * 60))
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(minute)
    }

    fn manager() -> (AlertLifecycleManager, EventBus) {
        let bus = EventBus::new(EventBusConfig {
            history_capacity: 100,
            queue_capacity: 16,
        });
        let manager = AlertLifecycleManager::new(LifecycleConfig::default(), bus.clone());
        (manager, bus)
    }

    fn triggered(outcome: BreachOutcome) -> AlertInstance {
        match outcome {
            BreachOutcome::Triggered(alert) => alert,
            other => panic!("expected Triggered, got {:?}", other),
        }
    }

    #[test]
    fn test_breach_creates_single_instance() {
        let (manager, bus) = manager();
        let rule = rule("high-cpu");

        let first = triggered(manager.on_breach(&rule, 91.0, at(0)));
        let second = manager.on_breach(&rule, 95.0, at(1));

        assert!(matches!(second, BreachOutcome::AlreadyLive(ref a) if a.id == first.id));
        assert_eq!(manager.active_alerts().len(), 1);
        assert_eq!(bus.history(Some(EventType::AlertTriggered), 10).len(), 1);
    }

    #[test]
    fn test_at_most_one_live_instance_per_rule() {
        let (manager, _bus) = manager();
        let rules = [rule("a"), rule("b")];

        for minute in 0..20 {
            for rule in &rules {
                if minute % 3 == 2 {
                    manager.on_clear(&rule.id, at(minute));
                } else {
                    manager.on_breach(rule, 90.0, at(minute));
                }
                let live = manager
                    .history(&HistoryFilter::default(), usize::MAX, 0)
                    .into_iter()
                    .filter(|a| a.rule_id == rule.id && a.is_live())
                    .count();
                assert!(live <= 1);
            }
        }
    }

    #[test]
    fn test_recovery_publishes_once_and_frees_rule() {
        let (manager, bus) = manager();
        let rule = rule("high-cpu");
        let first = triggered(manager.on_breach(&rule, 91.0, at(0)));

        let recovered = manager.on_clear("high-cpu", at(5)).unwrap();
        assert_eq!(recovered.id, first.id);
        assert_eq!(recovered.state, AlertState::Recovered);
        assert!(manager.on_clear("high-cpu", at(6)).is_none());
        assert_eq!(bus.history(Some(EventType::AlertRecovered), 10).len(), 1);
        assert!(!manager.has_live_alert("high-cpu"));

        let second = triggered(manager.on_breach(&rule, 92.0, at(7)));
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn test_acknowledge_keeps_alert_open_until_clear() {
        let (manager, bus) = manager();
        let rule = rule("high-cpu");
        let alert = triggered(manager.on_breach(&rule, 91.0, at(0)));
        let ack_time = Utc::now();

        let outcome = manager.acknowledge_at(&alert.id, "alice", ack_time);
        assert!(matches!(outcome, AckOutcome::Acknowledged(ref a) if a.state == AlertState::Acknowledged));
        assert!(manager.has_live_alert("high-cpu"));
        assert_eq!(manager.stats(ack_time).recovered_today, 0);
        assert_eq!(manager.stats(ack_time).acknowledged_today, 1);
        assert_eq!(bus.history(Some(EventType::AlertAcknowledged), 10).len(), 1);

        let recovered = manager.on_clear("high-cpu", ack_time).unwrap();
        assert_eq!(recovered.acknowledged_by.as_deref(), Some("alice"));
        assert_eq!(manager.stats(ack_time).recovered_today, 1);
    }

    #[test]
    fn test_acknowledge_unknown_and_repeated() {
        let (manager, _bus) = manager();
        assert_eq!(manager.acknowledge("nope", "bob"), AckOutcome::NotFound);

        let alert = triggered(manager.on_breach(&rule("high-cpu"), 91.0, at(0)));
        assert!(matches!(manager.acknowledge(&alert.id, "bob"), AckOutcome::Acknowledged(_)));
        assert!(matches!(manager.acknowledge(&alert.id, "carol"), AckOutcome::Unchanged(ref a) if a.acknowledged_by.as_deref() == Some("bob")));
    }

    #[test]
    fn test_acknowledge_after_recovery_is_noop() {
        let (manager, _bus) = manager();
        let alert = triggered(manager.on_breach(&rule("high-cpu"), 91.0, at(0)));
        manager.on_clear("high-cpu", at(1));

        let outcome = manager.acknowledge(&alert.id, "bob");
        assert!(matches!(outcome, AckOutcome::Unchanged(ref a) if a.state == AlertState::Recovered));
    }

    #[test]
    fn test_acknowledge_racing_recovery_ends_recovered() {
        for _ in 0..100 {
            let (manager, bus) = manager();
            let alert = triggered(manager.on_breach(&rule("high-cpu"), 91.0, at(0)));

            let (ack, cleared) = std::thread::scope(|s| {
                let ack = s.spawn(|| manager.acknowledge_at(&alert.id, "ops", at(1)));
                let clear = s.spawn(|| manager.on_clear("high-cpu", at(1)));
                (ack.join().unwrap(), clear.join().unwrap())
            });

            let cleared = cleared.expect("clear applies to the live alert");
            let stored = manager.get(&alert.id).unwrap();
            assert_eq!(stored.state, AlertState::Recovered);
            assert_eq!(stored.recovered_at, Some(at(1)));

            match ack {
                // Ack applied first: the recovered record keeps it
                AckOutcome::Acknowledged(_) => {
                    assert_eq!(cleared.acknowledged_by.as_deref(), Some("ops"));
                    assert_eq!(stored.acknowledged_by.as_deref(), Some("ops"));
                    assert_eq!(bus.history(Some(EventType::AlertAcknowledged), 10).len(), 1);
                }
                AckOutcome::Unchanged(seen) => {
                    assert_eq!(seen.state, AlertState::Recovered);
                    assert!(stored.acknowledged_by.is_none());
                    assert!(bus.history(Some(EventType::AlertAcknowledged), 10).is_empty());
                }
                AckOutcome::NotFound => panic!("alert vanished during the race"),
            }

            assert_eq!(bus.history(Some(EventType::AlertRecovered), 10).len(), 1);
            assert!(!manager.has_live_alert("high-cpu"));
            assert!(matches!(
                manager.acknowledge(&alert.id, "late"),
                AckOutcome::Unchanged(ref a) if a.state == AlertState::Recovered
            ));
        }
    }

    #[test]
    fn test_recovery_dispatch_admitted_once() {
        let (manager, _bus) = manager();
        let rule = rule("high-cpu");
        let quiet = triggered(manager.on_breach(&rule, 91.0, at(0)));
        manager.on_clear("high-cpu", at(1));
        assert!(manager.begin_recovery_dispatch(&quiet.id).is_none());

        let loud = triggered(manager.on_breach(&rule, 91.0, at(2)));
        assert!(manager.begin_recovery_dispatch(&loud.id).is_none());
        assert_eq!(manager.begin_dispatch(&loud.id, rule.silence, at(2)).unwrap().dispatches, 1);
        manager.on_clear("high-cpu", at(3));

        let admitted = manager.begin_recovery_dispatch(&loud.id).unwrap();
        assert_eq!(admitted.dispatches, 2);
        assert!(manager.begin_recovery_dispatch(&loud.id).is_none());
    }

    #[test]
    fn test_silence_window_gates_dispatch() {
        let (manager, _bus) = manager();
        let rule = rule("high-cpu");
        let alert = triggered(manager.on_breach(&rule, 91.0, at(0)));

        let mut dispatched = Vec::new();
        for minute in 0..=90 {
            if manager.begin_dispatch(&alert.id, rule.silence, at(minute)).is_some() {
                dispatched.push(minute);
            }
        }
        assert_eq!(dispatched, vec![0, 30, 60, 90]);
    }

    #[test]
    fn test_zero_silence_notifies_once() {
        let (manager, _bus) = manager();
        let rule = rule("high-cpu").with_silence(Duration::ZERO);
        let alert = triggered(manager.on_breach(&rule, 91.0, at(0)));

        assert!(manager.begin_dispatch(&alert.id, rule.silence, at(0)).is_some());
        assert!(manager.begin_dispatch(&alert.id, rule.silence, at(60)).is_none());
    }

    #[test]
    fn test_due_reminders_skip_acknowledged() {
        let (manager, _bus) = manager();
        let a = rule("a");
        let b = rule("b");
        let rules: HashMap<String, AlertRule> =
            [(a.id.clone(), a.clone()), (b.id.clone(), b.clone())].into();

        let alert_a = triggered(manager.on_breach(&a, 90.0, at(0)));
        let alert_b = triggered(manager.on_breach(&b, 90.0, at(0)));
        manager.begin_dispatch(&alert_a.id, a.silence, at(0));
        manager.begin_dispatch(&alert_b.id, b.silence, at(0));
        manager.acknowledge(&alert_b.id, "ops");

        assert!(manager.due_reminders(&rules, at(10)).is_empty());
        let due = manager.due_reminders(&rules, at(30));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, alert_a.id);
    }

    #[test]
    fn test_record_attempt_survives_recovery() {
        let (manager, _bus) = manager();
        let alert = triggered(manager.on_breach(&rule("high-cpu"), 91.0, at(0)));
        manager.on_clear("high-cpu", at(1));

        assert!(manager.record_attempt(&alert.id, NotificationAttempt::delivered("ops", 1)).is_some());
        let stored = manager.get(&alert.id).unwrap();
        assert_eq!(stored.notifications.len(), 1);
        assert_eq!(stored.notifications[0].outcome, AttemptOutcome::Delivered);
        assert!(manager.record_attempt("missing", NotificationAttempt::delivered("ops", 1)).is_none());
    }

    #[test]
    fn test_history_filters_and_paging() {
        let (manager, _bus) = manager();
        let warn = rule("warn");
        let crit = AlertRule {
            severity: AlertSeverity::Critical,
            ..rule("crit")
        };

        for minute in 0..3 {
            manager.on_breach(&warn, 90.0, at(minute * 10));
            manager.on_clear("warn", at(minute * 10 + 1));
        }
        manager.on_breach(&crit, 99.0, at(40));

        let all = manager.history(&HistoryFilter::default(), 100, 0);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].rule_id, "crit");

        let filter = HistoryFilter {
            level: Some(AlertSeverity::Warning),
            ..HistoryFilter::default()
        };
        let page = manager.history(&filter, 2, 1);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].triggered_at, at(10));

        let filter = HistoryFilter {
            status: Some(AlertState::Triggered),
            ..HistoryFilter::default()
        };
        assert_eq!(manager.history(&filter, 100, 0).len(), 1);

        let filter = HistoryFilter {
            rule_id: Some("warn".to_string()),
            from: Some(at(10)),
            to: Some(at(20)),
            ..HistoryFilter::default()
        };
        assert_eq!(manager.history(&filter, 100, 0).len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::default();
        let manager = AlertLifecycleManager::new(LifecycleConfig { max_history: 2 }, bus);
        let rule = rule("high-cpu");

        for minute in 0..5 {
            manager.on_breach(&rule, 90.0, at(minute * 2));
            manager.on_clear("high-cpu", at(minute * 2 + 1));
        }
        assert_eq!(manager.history(&HistoryFilter::default(), 100, 0).len(), 2);
        assert_eq!(manager.stats(at(20)).total, 2);
    }

    #[test]
    fn test_stats_by_level() {
        let (manager, _bus) = manager();
        manager.on_breach(&rule("a"), 90.0, at(0));
        manager.on_breach(&rule("b"), 90.0, at(0));
        let crit = AlertRule {
            severity: AlertSeverity::Critical,
            ..rule("c")
        };
        manager.on_breach(&crit, 90.0, at(0));

        let stats = manager.stats(at(1));
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 3);
        assert_eq!(stats.by_level.get(&AlertSeverity::Warning), Some(&2));
        assert_eq!(stats.by_level.get(&AlertSeverity::Critical), Some(&1));
    }
}
