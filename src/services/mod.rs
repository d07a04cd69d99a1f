//! Service layer
//!
//! Metric feeds, notification dispatch and the engine tick loop that ties
//! the alerting components together.

pub mod dispatcher;
pub mod engine;
pub mod feed;

pub use dispatcher::AlertDispatcher;
pub use engine::{AlertEngine, TickReport};
pub use feed::{spawn_json_lines, ChannelFeed, FeedSender, MetricFeed};
