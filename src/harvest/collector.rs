//! Single-shot collector.
//!
//! [`DataCollector`] drives one input broker into a set of output brokers
//! inline on the caller's task: no worker, no listener, no cancellation. It
//! follows the same per-record fan-out rules as the job executor and is meant
//! for smoke-testing a connector in isolation.

use crate::traits::{DataInputError, InputBroker, OutputBroker};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counters of one collection run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectSummary {
    /// Records read from the source
    pub records: usize,

    /// Successful (record, destination) publishes
    pub published: usize,

    /// Failed (record, destination) publishes
    pub failed: usize,

    /// Wall time of the run (milliseconds)
    pub duration_ms: u64,
}

pub struct DataCollector {
    source: Box<dyn InputBroker>,
    destinations: Vec<Box<dyn OutputBroker>>,
}

impl DataCollector {
    pub fn new(source: Box<dyn InputBroker>, destinations: Vec<Box<dyn OutputBroker>>) -> Self {
        Self {
            source,
            destinations,
        }
    }

    /// Reads the source to exhaustion, publishing every record to every
    /// destination. Brokers are closed before returning, on success or error.
    ///
    /// # Errors
    ///
    /// Returns the first [`DataInputError`]; publish failures are only counted.
    pub async fn collect(mut self) -> Result<CollectSummary, DataInputError> {
        let start = Instant::now();
        let mut summary = CollectSummary::default();

        info!(
            source = %self.source.describe(),
            destinations = self.destinations.len(),
            "Starting collection"
        );
        let result = self.run(&mut summary).await;

        if let Err(error) = self.source.close().await {
            warn!(error = %error, "Failed to close input broker");
        }
        for destination in self.destinations.iter_mut() {
            if let Err(error) = destination.close().await {
                warn!(error = %error, "Failed to close output broker");
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            records = summary.records,
            published = summary.published,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Collection finished"
        );
        result.map(|_| summary)
    }

    async fn run(&mut self, summary: &mut CollectSummary) -> Result<(), DataInputError> {
        if self.destinations.is_empty() {
            return Ok(());
        }
        while self.source.has_next().await? {
            let reference = self.source.next().await?;
            summary.records += 1;
            for destination in self.destinations.iter_mut() {
                match destination.publish(&reference).await {
                    Ok(()) => summary.published += 1,
                    Err(error) => {
                        debug!(
                            record = %reference,
                            destination = %destination.describe(),
                            error = %error,
                            "Publish failed"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, MockInput, MockOutput, PublishLog};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_collect_counts_outcomes() {
        let log = PublishLog::default();
        let collector = DataCollector::new(
            Box::new(MockInput::new(vec![record("r1"), record("r2")])),
            vec![
                Box::new(MockOutput::new("A", &log)),
                Box::new(MockOutput::new("B", &log).failing_on("r2")),
            ],
        );

        let summary = collector.collect().await.unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.published, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(log.entries(), vec!["r1@A", "r1@B", "r2@A", "r2@B"]);
    }

    #[tokio::test]
    async fn test_collect_releases_on_input_failure() {
        let log = PublishLog::default();
        let source = MockInput::new(vec![record("r1"), record("r2")]).failing_at(1);
        let tracker = source.tracker();
        let output = MockOutput::new("A", &log);
        let output_tracker = output.tracker();

        let result = DataCollector::new(Box::new(source), vec![Box::new(output)])
            .collect()
            .await;

        assert!(matches!(result, Err(DataInputError::Protocol(_))));
        assert!(log.entries().is_empty());
        assert!(tracker.closed.load(Ordering::SeqCst));
        assert!(output_tracker.closed.load(Ordering::SeqCst));
    }
}
