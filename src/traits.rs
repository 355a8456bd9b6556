use crate::model::DataReference;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reading from a source. Fatal to the current iteration.
#[derive(Error, Debug)]
pub enum DataInputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Failed to parse record: {0}")]
    Parse(String),
    /// `next()` was called without a preceding `true` from `has_next()`
    #[error("No more records available")]
    Exhausted,
}

/// Failure publishing a single record. Scoped to that one attempt.
#[derive(Error, Debug)]
pub enum DataOutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// Failure releasing a broker's connection or session.
#[derive(Error, Debug)]
#[error("Failed to release broker '{broker}': {message}")]
pub struct ReleaseError {
    pub broker: String,
    pub message: String,
}

impl ReleaseError {
    pub fn new(broker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            message: message.into(),
        }
    }
}

/// What a [`Listener`] is told about through `on_error`.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Input failure: {0}")]
    Input(#[from] DataInputError),
    #[error("Output failure on '{destination}': {source}")]
    Output {
        destination: String,
        #[source]
        source: DataOutputError,
    },
    #[error(transparent)]
    Release(#[from] ReleaseError),
}

/// Forward-only, resumable iteration over the records of one source.
///
/// The broker owns its connection/session. The job that was handed the broker
/// calls [`close`](InputBroker::close) exactly once on every exit path.
#[async_trait]
pub trait InputBroker: Send {
    /// Human readable identity used in logs and error reports.
    fn describe(&self) -> String;

    /// Checks whether another record is available. May fetch the next page.
    async fn has_next(&mut self) -> Result<bool, DataInputError>;

    /// Consumes the next record. Fails fast with [`DataInputError::Exhausted`]
    /// when nothing is pending.
    async fn next(&mut self) -> Result<DataReference, DataInputError>;

    /// Releases any open connection. Default: nothing to release.
    async fn close(&mut self) -> Result<(), ReleaseError> {
        Ok(())
    }
}

/// Delivery of records to one destination.
#[async_trait]
pub trait OutputBroker: Send {
    fn describe(&self) -> String;

    /// Delivers one record. Called repeatedly with distinct records during a job.
    async fn publish(&mut self, reference: &DataReference) -> Result<(), DataOutputError>;

    async fn close(&mut self) -> Result<(), ReleaseError> {
        Ok(())
    }
}

/// Lifecycle and per-item callbacks of a harvest job.
///
/// Exactly one `on_started` and one `on_completed` per job; `on_success` /
/// `on_error` happen in between, one per (record, destination) publish attempt.
pub trait Listener: Send + Sync {
    fn on_started(&self) {}

    fn on_success(&self, _reference: &DataReference) {}

    fn on_error(&self, _error: &HarvestError) {}

    fn on_completed(&self) {}
}

/// Listener that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl Listener for NoopListener {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_error_names_destination() {
        let error = HarvestError::Output {
            destination: "FOLDER:/tmp/out".to_string(),
            source: DataOutputError::Rejected("bad".to_string()),
        };
        let message = error.to_string();
        assert!(message.contains("FOLDER:/tmp/out"));
        assert!(message.contains("bad"));
    }

    #[test]
    fn test_release_error_is_transparent() {
        let error: HarvestError = ReleaseError::new("CONSOLE", "broken pipe").into();
        assert_eq!(error.to_string(), "Failed to release broker 'CONSOLE': broken pipe");
    }
}
