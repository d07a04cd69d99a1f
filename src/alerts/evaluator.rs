//! Rule evaluator
//!
//! Turns samples into breach/clear signals using a continuous-hold timer per
//! rule. A sample stands for the sampling interval that ends at its
//! timestamp, so a hold that starts with a sample at `t` is considered to
//! have started at `t - sample_interval`.

use crate::domain::{AlertRule, MetricSample};
use crate::error::EvaluationError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Evaluator output for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing changed
    None,
    /// Condition held for at least the rule duration
    Breach,
    /// Condition stopped holding while the rule had a live alert
    Clear,
}

/// Evaluator configuration
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Expected spacing between samples of one metric
    pub sample_interval: Duration,
    /// Gap after which a running hold is discarded
    pub staleness: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
            staleness: Duration::from_secs(15),
        }
    }
}

/// Per-rule evaluation window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HoldState {
    /// Start of the current uninterrupted hold
    hold_start: Option<DateTime<Utc>>,
    /// Whether this hold already produced a breach
    breached: bool,
    /// Timestamp of the last accepted sample
    last_sample: Option<DateTime<Utc>>,
}

impl HoldState {
    fn reset(&mut self) {
        self.hold_start = None;
        self.breached = false;
    }
}

/// Stateful rule evaluator
#[derive(Debug, Default)]
pub struct RuleEvaluator {
    config: EvaluatorConfig,
    holds: HashMap<String, HoldState>,
}

impl RuleEvaluator {
    /// Create a new evaluator
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            holds: HashMap::new(),
        }
    }

    /// Evaluate one sample for a rule
    ///
    /// `has_live_alert` tells the evaluator whether the rule currently has a
    /// non-recovered alert; `Clear` is only emitted in that case.
    pub fn evaluate(
        &mut self,
        rule: &AlertRule,
        sample: &MetricSample,
        has_live_alert: bool,
    ) -> Result<Signal, EvaluationError> {
        if sample.metric != rule.metric {
            return Err(EvaluationError::MetricMismatch {
                rule_id: rule.id.clone(),
                expected: rule.metric.to_string(),
                actual: sample.metric.to_string(),
            });
        }
        if !sample.value.is_finite() {
            return Err(EvaluationError::MalformedSample {
                metric: sample.metric.to_string(),
                value: sample.value,
            });
        }

        let now = sample.timestamp;
        let staleness = self.config.staleness;
        let interval = to_chrono(self.config.sample_interval);
        let state = self.holds.entry(rule.id.clone()).or_default();

        if let Some(last) = state.last_sample {
            if now < last {
                log::debug!(
                    "Rule '{}': ignoring out-of-order sample at {} (last {})",
                    rule.id,
                    now,
                    last
                );
                return Ok(Signal::None);
            }
            if now - last > to_chrono(staleness) && state.hold_start.is_some() {
                log::debug!(
                    "Rule '{}': sample gap of {}s exceeds staleness, resetting hold",
                    rule.id,
                    (now - last).num_seconds()
                );
                state.reset();
            }
        }
        state.last_sample = Some(now);

        if !rule.matches(sample.value) {
            state.reset();
            return Ok(if has_live_alert {
                Signal::Clear
            } else {
                Signal::None
            });
        }

        let hold_start = *state.hold_start.get_or_insert(now - interval);
        if state.breached {
            return Ok(Signal::None);
        }

        if now - hold_start >= to_chrono(rule.duration) {
            state.breached = true;
            log::debug!(
                "Rule '{}': held {}s (>= {}s), breach",
                rule.id,
                (now - hold_start).num_seconds(),
                rule.duration.as_secs()
            );
            return Ok(Signal::Breach);
        }

        Ok(Signal::None)
    }

    /// Start of the running hold for a rule, if any
    pub fn hold_start(&self, rule_id: &str) -> Option<DateTime<Utc>> {
        self.holds.get(rule_id).and_then(|s| s.hold_start)
    }

    /// Drop evaluation state for rules no longer present
    pub fn retain_rules<'a, I>(&mut self, rule_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: std::collections::HashSet<&str> = rule_ids.into_iter().collect();
        self.holds.retain(|id, _| keep.contains(id.as_str()));
    }

    /// Forget the state of one rule
    pub fn reset(&mut self, rule_id: &str) {
        self.holds.remove(rule_id);
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertSeverity, Comparison, MetricType};
    use chrono::TimeZone;

    fn cpu() -> MetricType {
        MetricType::new("cpu").unwrap()
    }

    fn rule(duration_mins: u64) -> AlertRule {
        AlertRule::new(
            "high-cpu",
            "High CPU",
            cpu(),
            Comparison::Gt,
            80.0,
            AlertSeverity::Warning,
        )
        .with_duration(Duration::from_secs(duration_mins * 60))
    }

    fn minutes(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(n)
    }

    fn evaluator() -> RuleEvaluator {
        RuleEvaluator::new(EvaluatorConfig {
            sample_interval: Duration::from_secs(60),
            staleness: Duration::from_secs(180),
        })
    }

    fn sample(minute: i64, value: f64) -> MetricSample {
        MetricSample::new(cpu(), value, minutes(minute))
    }

    #[test]
    fn test_scenario_hold_restarts_after_dip() {
        let rule = rule(5);
        let mut eval = evaluator();
        let values = [85.0, 82.0, 81.0, 79.0, 90.0, 91.0, 92.0, 93.0, 94.0];

        let mut signals = Vec::new();
        for (i, value) in values.iter().enumerate() {
            let signal = eval.evaluate(&rule, &sample(i as i64, *value), false).unwrap();
            signals.push(signal);

            match i {
                0 => assert!(eval.hold_start("high-cpu").is_some()),
                3 => assert!(eval.hold_start("high-cpu").is_none()),
                4 => assert_eq!(eval.hold_start("high-cpu"), Some(minutes(3))),
                _ => {}
            }
        }

        let breaches: Vec<usize> = signals
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Signal::Breach)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(breaches, vec![8]);
    }

    #[test]
    fn test_breach_emitted_once_per_hold() {
        let rule = rule(2);
        let mut eval = evaluator();

        let signals: Vec<Signal> = (0..10)
            .map(|m| eval.evaluate(&rule, &sample(m, 95.0), false).unwrap())
            .collect();

        assert_eq!(signals.iter().filter(|s| **s == Signal::Breach).count(), 1);
        assert_eq!(signals[1], Signal::Breach);
    }

    #[test]
    fn test_zero_duration_breaches_immediately() {
        let rule = rule(0);
        let mut eval = evaluator();
        assert_eq!(
            eval.evaluate(&rule, &sample(0, 81.0), false).unwrap(),
            Signal::Breach
        );
    }

    #[test]
    fn test_clear_only_with_live_alert() {
        let rule = rule(0);
        let mut eval = evaluator();

        assert_eq!(
            eval.evaluate(&rule, &sample(0, 70.0), false).unwrap(),
            Signal::None
        );
        assert_eq!(
            eval.evaluate(&rule, &sample(1, 70.0), true).unwrap(),
            Signal::Clear
        );
    }

    #[test]
    fn test_new_hold_after_clear_breaches_again() {
        let rule = rule(0);
        let mut eval = evaluator();

        assert_eq!(eval.evaluate(&rule, &sample(0, 90.0), false).unwrap(), Signal::Breach);
        assert_eq!(eval.evaluate(&rule, &sample(1, 70.0), true).unwrap(), Signal::Clear);
        assert_eq!(eval.evaluate(&rule, &sample(2, 90.0), false).unwrap(), Signal::Breach);
    }

    #[test]
    fn test_sampling_gap_resets_hold() {
        let rule = rule(5);
        let mut eval = evaluator();

        for m in 0..3 {
            eval.evaluate(&rule, &sample(m, 90.0), false).unwrap();
        }
        assert_eq!(eval.hold_start("high-cpu"), Some(minutes(-1)));

        // Ten minute silence from the feed
        let signal = eval.evaluate(&rule, &sample(12, 90.0), false).unwrap();
        assert_eq!(signal, Signal::None);
        assert_eq!(eval.hold_start("high-cpu"), Some(minutes(11)));
    }

    #[test]
    fn test_metric_mismatch_is_error_and_keeps_state() {
        let rule = rule(5);
        let mut eval = evaluator();
        eval.evaluate(&rule, &sample(0, 90.0), false).unwrap();

        let other = MetricSample::new(MetricType::new("memory").unwrap(), 99.0, minutes(1));
        let err = eval.evaluate(&rule, &other, false).unwrap_err();
        assert!(matches!(err, EvaluationError::MetricMismatch { .. }));
        assert_eq!(eval.hold_start("high-cpu"), Some(minutes(-1)));
    }

    #[test]
    fn test_non_finite_sample_rejected() {
        let rule = rule(0);
        let mut eval = evaluator();
        let err = eval
            .evaluate(&rule, &sample(0, f64::NAN), false)
            .unwrap_err();
        assert!(matches!(err, EvaluationError::MalformedSample { .. }));
        assert!(eval.hold_start("high-cpu").is_none());
    }

    #[test]
    fn test_retain_rules_drops_removed() {
        let rule = rule(5);
        let mut eval = evaluator();
        eval.evaluate(&rule, &sample(0, 90.0), false).unwrap();

        eval.retain_rules(["other"]);
        assert!(eval.hold_start("high-cpu").is_none());
    }
}
