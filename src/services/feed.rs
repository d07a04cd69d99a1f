//! Metric feeds
//!
//! The engine pulls samples from a [`MetricFeed`] once per tick. The
//! provided feed is channel-backed: producers push samples through a
//! [`FeedSender`], and [`spawn_json_lines`] turns any async line source
//! (stdin, a file) into such a producer.

use crate::domain::MetricSample;
use crate::error::FeedError;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Source of metric samples
#[async_trait]
pub trait MetricFeed: Send {
    /// Samples that arrived since the previous poll, in arrival order
    ///
    /// Returns `Ok(None)` once the feed has ended and is fully drained.
    async fn poll(&mut self) -> Result<Option<Vec<MetricSample>>, FeedError>;
}

/// Producer half of a [`ChannelFeed`]
#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::Sender<Result<MetricSample, FeedError>>,
}

impl FeedSender {
    /// Push a sample, waiting for buffer space
    ///
    /// Returns `false` if the feed was dropped.
    pub async fn send(&self, sample: MetricSample) -> bool {
        self.tx.send(Ok(sample)).await.is_ok()
    }

    /// Report a producer failure to the consumer
    pub async fn fail(&self, error: FeedError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }
}

/// Channel-backed feed
#[derive(Debug)]
pub struct ChannelFeed {
    rx: mpsc::Receiver<Result<MetricSample, FeedError>>,
}

impl ChannelFeed {
    /// Create a feed buffering up to `capacity` pending samples
    pub fn new(capacity: usize) -> (FeedSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (FeedSender { tx }, Self { rx })
    }

    /// Wait for the producers to finish and return every sample
    pub async fn collect(mut self) -> Result<Vec<MetricSample>, FeedError> {
        let mut samples = Vec::new();
        while let Some(item) = self.rx.recv().await {
            match item {
                Ok(sample) => samples.push(sample),
                Err(FeedError::Decode { line, message }) => {
                    log::warn!("Skipping sample at line {}: {}", line, message);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(samples)
    }
}

#[async_trait]
impl MetricFeed for ChannelFeed {
    async fn poll(&mut self) -> Result<Option<Vec<MetricSample>>, FeedError> {
        let mut batch = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Ok(sample)) => batch.push(sample),
                Ok(Err(FeedError::Decode { line, message })) => {
                    log::warn!("Skipping sample at line {}: {}", line, message);
                }
                Ok(Err(e)) => return Err(e),
                Err(TryRecvError::Empty) => return Ok(Some(batch)),
                Err(TryRecvError::Disconnected) if batch.is_empty() => return Ok(None),
                Err(TryRecvError::Disconnected) => return Ok(Some(batch)),
            }
        }
    }
}

/// Decode one JSON-lines record: `{"type": "cpu", "value": 91.2, "timestamp": "..."}`
pub fn decode_line(line_no: usize, line: &str) -> Result<MetricSample, FeedError> {
    serde_json::from_str(line).map_err(|e| FeedError::Decode {
        line: line_no,
        message: e.to_string(),
    })
}

/// Read JSON-lines samples from `reader` on a background task
///
/// Blank lines are ignored; undecodable lines are reported and skipped.
/// The feed ends when the reader reaches EOF.
pub fn spawn_json_lines<R>(reader: R, capacity: usize) -> ChannelFeed
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (sender, feed) = ChannelFeed::new(capacity);

    tokio::spawn(async move {
        let mut lines = reader.lines();
        let mut line_no = 0;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    sender.fail(FeedError::Io(e)).await;
                    break;
                }
            };
            line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let delivered = match decode_line(line_no, &line) {
                Ok(sample) => sender.send(sample).await,
                Err(e) => sender.fail(e).await,
            };
            if !delivered {
                break;
            }
        }
        log::debug!("Sample reader finished after {} lines", line_no);
    });

    feed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MetricType;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_decode_line() {
        let sample =
            decode_line(1, r#"{"type":"CPU","value":91.5,"timestamp":"2024-05-01T10:00:00Z"}"#)
                .unwrap();
        assert_eq!(sample.metric.as_str(), "cpu");
        assert_eq!(sample.value, 91.5);

        assert!(matches!(
            decode_line(7, r#"{"type":"cpu"}"#),
            Err(FeedError::Decode { line: 7, .. })
        ));
        assert!(decode_line(1, r#"{"type":"cpu load","value":1,"timestamp":"2024-05-01T10:00:00Z"}"#).is_err());
    }

    #[tokio::test]
    async fn test_channel_feed_batches_and_ends() {
        let (sender, mut feed) = ChannelFeed::new(8);
        let cpu = MetricType::new("cpu").unwrap();

        assert_eq!(feed.poll().await.unwrap(), Some(vec![]));

        for value in [1.0, 2.0] {
            assert!(sender.send(MetricSample::new(cpu.clone(), value, Utc::now())).await);
        }
        let batch = feed.poll().await.unwrap().unwrap();
        assert_eq!(batch.iter().map(|s| s.value).collect::<Vec<_>>(), vec![1.0, 2.0]);

        sender.send(MetricSample::new(cpu, 3.0, Utc::now())).await;
        drop(sender);
        assert_eq!(feed.poll().await.unwrap().unwrap().len(), 1);
        assert_eq!(feed.poll().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_lines_skips_bad_records() {
        let input = concat!(
            r#"{"type":"cpu","value":81,"timestamp":"2024-05-01T10:00:00Z"}"#,
            "\n\nnot json\n",
            r#"{"type":"cpu","value":82,"timestamp":"2024-05-01T10:01:00Z"}"#,
            "\n"
        );
        let mut feed = spawn_json_lines(tokio::io::BufReader::new(input.as_bytes()), 16);

        let mut samples = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(1), feed.poll()).await.unwrap() {
                Ok(Some(batch)) => samples.extend(batch),
                Ok(None) => break,
                Err(e) => panic!("unexpected feed error: {}", e),
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(samples.iter().map(|s| s.value).collect::<Vec<_>>(), vec![81.0, 82.0]);
    }

    #[tokio::test]
    async fn test_collect_reads_to_end() {
        let input = concat!(
            r#"{"type":"memory","value":70,"timestamp":"2024-05-01T10:00:00Z"}"#,
            "\n{broken\n",
            r#"{"type":"memory","value":95,"timestamp":"2024-05-01T10:00:05Z"}"#,
        );
        let feed = spawn_json_lines(tokio::io::BufReader::new(input.as_bytes()), 1);

        let samples = feed.collect().await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].value, 95.0);
    }
}
