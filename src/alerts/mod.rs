//! Alert evaluation and lifecycle
//!
//! Rule configuration and stores, the per-rule hold evaluator, and the
//! lifecycle manager owning every alert instance.

mod config;
mod evaluator;
mod lifecycle;
mod store;

pub use config::{to_alert_rules, to_channels, AlertRuleConfig, ChannelConfig, RuleSet};
pub use evaluator::{EvaluatorConfig, RuleEvaluator, Signal};
pub use lifecycle::{
    AckOutcome, AlertLifecycleManager, AlertStats, BreachOutcome, HistoryFilter, LifecycleConfig,
};
pub use store::{FileRuleStore, RuleCache, RuleStore, StaticRuleStore};
