//! Mock brokers shared by the unit tests.

use crate::executor::HarvestEvent;
use crate::model::{ContentType, DataReference};
use crate::traits::{DataInputError, DataOutputError, InputBroker, OutputBroker, ReleaseError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Deterministic record: equal ids compare equal.
pub fn record(id: &str) -> DataReference {
    DataReference::new(
        id,
        format!("mock://{id}"),
        "MOCK",
        id.as_bytes().to_vec(),
        ContentType::Text,
    )
    .with_fetch_timestamp(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
}

/// Collects every event until the job drops its listener.
pub async fn drain(mut events: mpsc::UnboundedReceiver<HarvestEvent>) -> Vec<HarvestEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}

#[derive(Clone, Default)]
pub struct Tracker {
    pub next_calls: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

pub struct MockInput {
    records: VecDeque<DataReference>,
    endless: bool,
    fail_at: Option<usize>,
    fail_has_next_at: Option<usize>,
    has_next_calls: usize,
    delay: Option<Duration>,
    tracker: Tracker,
}

impl MockInput {
    pub fn new(records: Vec<DataReference>) -> Self {
        Self {
            records: records.into(),
            endless: false,
            fail_at: None,
            fail_has_next_at: None,
            has_next_calls: 0,
            delay: None,
            tracker: Tracker::default(),
        }
    }

    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::new(vec![])
        }
    }

    /// Fails the `call`-th invocation of `next()` (1-based).
    pub fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }

    /// Fails the `call`-th invocation of `has_next()` (1-based).
    pub fn failing_has_next_at(mut self, call: usize) -> Self {
        self.fail_has_next_at = Some(call);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

#[async_trait]
impl InputBroker for MockInput {
    fn describe(&self) -> String {
        "MOCK".to_string()
    }

    async fn has_next(&mut self) -> Result<bool, DataInputError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.has_next_calls += 1;
        if self.fail_has_next_at == Some(self.has_next_calls) {
            return Err(DataInputError::Protocol("connection reset".to_string()));
        }
        Ok(self.endless || !self.records.is_empty())
    }

    async fn next(&mut self) -> Result<DataReference, DataInputError> {
        let call = self.tracker.next_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at == Some(call) {
            return Err(DataInputError::Protocol(format!("induced failure at {call}")));
        }
        if self.endless {
            return Ok(record(&format!("e{call}")));
        }
        self.records.pop_front().ok_or(DataInputError::Exhausted)
    }

    async fn close(&mut self) -> Result<(), ReleaseError> {
        self.tracker.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Publish attempts shared across destinations, as `"<id>@<destination>"`.
#[derive(Clone, Default)]
pub struct PublishLog(Arc<Mutex<Vec<String>>>);

impl PublishLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

enum FailMode {
    Never,
    On(String),
    Always,
}

pub struct MockOutput {
    name: String,
    log: PublishLog,
    fail: FailMode,
    fail_close: bool,
    panic_on: Option<String>,
    panic_on_close: bool,
    tracker: Tracker,
}

impl MockOutput {
    pub fn new(name: &str, log: &PublishLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail: FailMode::Never,
            fail_close: false,
            panic_on: None,
            panic_on_close: false,
            tracker: Tracker::default(),
        }
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.fail = FailMode::On(id.to_string());
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.fail = FailMode::Always;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Panics while publishing the record with the given id.
    pub fn panicking_on(mut self, id: &str) -> Self {
        self.panic_on = Some(id.to_string());
        self
    }

    pub fn panicking_close(mut self) -> Self {
        self.panic_on_close = true;
        self
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

#[async_trait]
impl OutputBroker for MockOutput {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn publish(&mut self, reference: &DataReference) -> Result<(), DataOutputError> {
        self.log
            .0
            .lock()
            .unwrap()
            .push(format!("{}@{}", reference.id(), self.name));
        if self.panic_on.as_deref() == Some(reference.id()) {
            panic!("mock destination panicked on {}", reference.id());
        }
        match &self.fail {
            FailMode::Always => Err(DataOutputError::Rejected("always".to_string())),
            FailMode::On(id) if id == reference.id() => {
                Err(DataOutputError::Rejected(format!("refused {id}")))
            }
            _ => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), ReleaseError> {
        self.tracker.closed.store(true, Ordering::SeqCst);
        if self.panic_on_close {
            panic!("mock destination panicked while closing");
        }
        if self.fail_close {
            return Err(ReleaseError::new(&self.name, "close failed"));
        }
        Ok(())
    }
}
