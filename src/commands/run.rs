//! Run command implementation
//!
//! Reads JSON-lines samples from stdin or a file, evaluates them against
//! the configured rules and dispatches notifications over HTTP. Lifecycle
//! events are printed to stderr; a summary goes to stdout on exit.

use super::LoadedConfig;
use crate::alerts::{FileRuleStore, RuleStore, StaticRuleStore};
use crate::bus::EventFilter;
use crate::cli::args::{OutputFormat, RunArgs};
use crate::cli::output::{print_output, RunSummary};
use crate::error::Result;
use crate::notify::{HttpTransport, TerminalNotifier};
use crate::services::{spawn_json_lines, AlertEngine, ChannelFeed};
use crate::shutdown;
use chrono::Utc;
use std::sync::Arc;
use tokio::io::BufReader;

/// Samples buffered between the reader and the engine
const FEED_CAPACITY: usize = 1024;

/// Execute the run command
pub async fn run_engine(loaded: &LoadedConfig, args: &RunArgs, format: OutputFormat) -> Result<()> {
    let config = &loaded.config;
    for warning in config.validate()? {
        log::warn!("{}", warning);
    }

    let store = rule_store(loaded)?;
    let transport = Arc::new(HttpTransport::new()?);

    let (trigger, stop) = shutdown::channel();
    let mut engine = AlertEngine::new(config, store, transport, stop.clone())?;
    engine
        .bus()
        .subscribe(EventFilter::all(), Arc::new(TerminalNotifier::new()));

    let mut feed = open_feed(args).await?;

    if args.once {
        let samples = feed.collect().await?;
        log::info!("Evaluating {} samples", samples.len());
        engine.tick(&samples, Utc::now()).await;
        engine.settle().await;
    } else {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Received Ctrl-C, stopping");
                    trigger.trigger();
                }
                Err(e) => log::warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });

        engine.run(&mut feed, stop).await?;
    }

    print_output(&RunSummary { stats: engine.stats() }, format)?;
    Ok(())
}

/// Pick where rules come from
///
/// A separate rule file wins, then the config file itself (both re-read
/// every tick); without any file the built-in rule list is used.
fn rule_store(loaded: &LoadedConfig) -> Result<Arc<dyn RuleStore>> {
    if let Some(path) = loaded.rules_path() {
        log::info!("Reading rules from {}", path.display());
        return Ok(Arc::new(FileRuleStore::new(path)));
    }
    if let Some(path) = &loaded.source {
        log::info!("Reading rules from {}", path.display());
        return Ok(Arc::new(FileRuleStore::new(path)));
    }

    let rules = loaded.config.to_rules()?;
    if rules.is_empty() {
        log::warn!("No rules configured; run 'alertctl init' to write a starter config");
    }
    Ok(Arc::new(StaticRuleStore::new(rules)))
}

async fn open_feed(args: &RunArgs) -> Result<ChannelFeed> {
    let feed = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            spawn_json_lines(BufReader::new(file), FEED_CAPACITY)
        }
        None => spawn_json_lines(BufReader::new(tokio::io::stdin()), FEED_CAPACITY),
    };
    Ok(feed)
}
