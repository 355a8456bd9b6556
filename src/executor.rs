//! Harvest job execution.
//!
//! A [`Processor`] turns one [`InputBroker`], zero or more [`OutputBroker`]s and
//! a [`Listener`] into a [`Handler`]. Once begun, the job runs on its own tokio
//! task:
//! - every record from the source is offered to every destination, in order
//! - a failed publish is reported and skipped, a failed read ends the job
//! - cancellation is cooperative and observed between records
//! - brokers are closed on every exit path before `on_completed` fires
//! - a panicking broker call counts as a failure of that call; a panicking
//!   listener callback is logged and skipped

use crate::model::DataReference;
use crate::traits::{
    DataInputError, DataOutputError, HarvestError, InputBroker, Listener, NoopListener,
    OutputBroker, ReleaseError,
};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("No tokio runtime available to run the harvest job")]
    NoRuntime,
}

/// Lifecycle of a harvest job: `Created → Running → {Completed, Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    /// Source exhausted or failed; all callbacks delivered
    Completed,
    /// Stopped early on request
    Aborted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Aborted)
    }
}

/// Builds cancellable harvest jobs.
pub trait Processor: Send + Sync {
    /// Prepares a job in the `Created` state. Nothing runs until
    /// [`Handler::begin`] is called.
    fn initialize(
        &self,
        source: Box<dyn InputBroker>,
        destinations: Vec<Box<dyn OutputBroker>>,
        listener: Arc<dyn Listener>,
    ) -> Handler;
}

/// Processor running each job on a dedicated tokio task.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProcessor;

impl DefaultProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for DefaultProcessor {
    fn initialize(
        &self,
        source: Box<dyn InputBroker>,
        destinations: Vec<Box<dyn OutputBroker>>,
        listener: Arc<dyn Listener>,
    ) -> Handler {
        let description = format!(
            "{} -> [{}]",
            source.describe(),
            destinations
                .iter()
                .map(|d| d.describe())
                .collect::<Vec<_>>()
                .join(",")
        );
        debug!(harvest = %description, "Initializing default processor");

        Handler::new(Job {
            source,
            destinations,
            listener,
            description,
        })
    }
}

struct Job {
    source: Box<dyn InputBroker>,
    destinations: Vec<Box<dyn OutputBroker>>,
    listener: Arc<dyn Listener>,
    description: String,
}

/// Caller-facing control surface of one job.
///
/// `begin` launches the worker and returns immediately; `abort` requests a
/// cooperative stop. Both are no-ops once the job is terminal.
pub struct Handler {
    job: Mutex<Option<Job>>,
    description: String,
    cancel: CancellationToken,
    state: Arc<watch::Sender<JobState>>,
}

impl Handler {
    fn new(job: Job) -> Self {
        let (state, _) = watch::channel(JobState::Created);
        Self {
            description: job.description.clone(),
            job: Mutex::new(Some(job)),
            cancel: CancellationToken::new(),
            state: Arc::new(state),
        }
    }

    /// Launches the worker on the current tokio runtime.
    ///
    /// A second call, or a call on a terminal job, does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::NoRuntime`] when called outside a tokio
    /// runtime; the job stays `Created` and may be begun later.
    #[instrument(skip(self), fields(harvest = %self.description))]
    pub fn begin(&self) -> Result<(), ProcessorError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ProcessorError::NoRuntime)?;

        let job = match self.job.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(job) = job else {
            debug!("Job already begun, ignoring");
            return Ok(());
        };

        self.state.send_replace(JobState::Running);
        runtime.spawn(run(job, self.cancel.clone(), Arc::clone(&self.state)));
        Ok(())
    }

    /// Requests cancellation. The worker stops at the next record boundary;
    /// a publish already in flight is allowed to finish.
    ///
    /// Aborting a job that was never begun makes it stop before reading its
    /// first record once it is begun.
    pub fn abort(&self) {
        if self.state().is_terminal() {
            return;
        }
        debug!(harvest = %self.description, "Abort requested");
        self.cancel.cancel();
    }

    /// Whether the worker is still running.
    pub fn is_active(&self) -> bool {
        self.state() == JobState::Running
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Waits until the job reaches a terminal state.
    ///
    /// Never resolves for a job that is never begun.
    pub async fn wait(&self) -> JobState {
        let mut receiver = self.state.subscribe();
        receiver
            .wait_for(JobState::is_terminal)
            .await
            .map(|state| *state)
            .unwrap_or_else(|_| self.state())
    }
}

/// A job that was never begun still owns its brokers; they are closed on a
/// background task when a runtime is available. No listener callback fires.
impl Drop for Handler {
    fn drop(&mut self) {
        let job = match self.job.get_mut() {
            Ok(job) => job.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut job) = job else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(harvest = %job.description, "Releasing brokers of a job never begun");
                runtime.spawn(async move {
                    release(
                        job.source.as_mut(),
                        &mut job.destinations,
                        &NoopListener,
                        &job.description,
                    )
                    .await;
                });
            }
            Err(_) => {
                warn!(harvest = %job.description, "Dropped a job never begun outside a runtime");
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("description", &self.description)
            .field("state", &self.state())
            .finish()
    }
}

enum Termination {
    Exhausted,
    Cancelled,
}

/// Publishes the terminal state when the worker returns or unwinds.
struct TerminalState {
    state: Arc<watch::Sender<JobState>>,
    terminal: JobState,
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        self.state.send_replace(self.terminal);
    }
}

async fn run(job: Job, cancel: CancellationToken, state: Arc<watch::Sender<JobState>>) {
    let Job {
        mut source,
        mut destinations,
        listener,
        description,
    } = job;
    let mut exit = TerminalState {
        state,
        terminal: JobState::Completed,
    };

    info!(harvest = %description, "Started harvest");
    notify(&description, || listener.on_started());

    let outcome = if destinations.is_empty() {
        debug!(harvest = %description, "No destinations, nothing to harvest");
        if cancel.is_cancelled() {
            Ok(Termination::Cancelled)
        } else {
            Ok(Termination::Exhausted)
        }
    } else {
        drive(
            source.as_mut(),
            &mut destinations,
            listener.as_ref(),
            &cancel,
            &description,
        )
        .await
    };

    exit.terminal = match outcome {
        Ok(Termination::Exhausted) => JobState::Completed,
        Ok(Termination::Cancelled) => JobState::Aborted,
        Err(error) => {
            warn!(harvest = %description, error = %error, "Harvest input failed");
            notify(&description, || listener.on_error(&HarvestError::Input(error)));
            JobState::Completed
        }
    };

    release(
        source.as_mut(),
        &mut destinations,
        listener.as_ref(),
        &description,
    )
    .await;

    notify(&description, || listener.on_completed());
    info!(harvest = %description, state = ?exit.terminal, "Completed harvest");
}

/// Runs one broker call, turning a panic into the error built by `on_panic`.
async fn contained<T, E>(
    call: impl Future<Output = Result<T, E>>,
    on_panic: impl FnOnce() -> E,
) -> Result<T, E> {
    AssertUnwindSafe(call)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(on_panic()))
}

fn notify(description: &str, callback: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!(harvest = %description, "Listener panicked");
    }
}

async fn drive(
    source: &mut dyn InputBroker,
    destinations: &mut [Box<dyn OutputBroker>],
    listener: &dyn Listener,
    cancel: &CancellationToken,
    description: &str,
) -> Result<Termination, DataInputError> {
    let panicked = || DataInputError::Protocol("input broker panicked".to_string());
    loop {
        if cancel.is_cancelled() {
            return Ok(Termination::Cancelled);
        }
        if !contained(source.has_next(), panicked).await? {
            return Ok(Termination::Exhausted);
        }
        if cancel.is_cancelled() {
            return Ok(Termination::Cancelled);
        }

        let reference = contained(source.next(), panicked).await?;
        publish_all(&reference, destinations, listener, description).await;
    }
}

async fn publish_all(
    reference: &DataReference,
    destinations: &mut [Box<dyn OutputBroker>],
    listener: &dyn Listener,
    description: &str,
) {
    for destination in destinations.iter_mut() {
        let published = contained(destination.publish(reference), || {
            DataOutputError::Rejected("output broker panicked".to_string())
        })
        .await;

        match published {
            Ok(()) => {
                debug!(harvest = %description, record = %reference, "Harvested");
                notify(description, || listener.on_success(reference));
            }
            Err(source) => {
                debug!(
                    harvest = %description,
                    record = %reference,
                    error = %source,
                    "Failed harvesting"
                );
                let error = HarvestError::Output {
                    destination: destination.describe(),
                    source,
                };
                notify(description, || listener.on_error(&error));
            }
        }
    }
}

async fn release(
    source: &mut dyn InputBroker,
    destinations: &mut [Box<dyn OutputBroker>],
    listener: &dyn Listener,
    description: &str,
) {
    let name = source.describe();
    let closed = contained(source.close(), || {
        ReleaseError::new(&name, "panicked while closing")
    })
    .await;
    if let Err(error) = closed {
        warn!(harvest = %description, error = %error, "Failed to close input broker");
        notify(description, || listener.on_error(&HarvestError::Release(error)));
    }

    for destination in destinations.iter_mut() {
        let name = destination.describe();
        let closed = contained(destination.close(), || {
            ReleaseError::new(&name, "panicked while closing")
        })
        .await;
        if let Err(error) = closed {
            warn!(harvest = %description, error = %error, "Failed to close output broker");
            notify(description, || listener.on_error(&HarvestError::Release(error)));
        }
    }
}

/// Listener callbacks as messages.
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestEvent {
    Started,
    Success(DataReference),
    /// Rendered failure message
    Error(String),
    Completed,
}

/// Listener forwarding every callback into an unbounded channel, in order.
///
/// The receiver yields `None` once the job has finished and dropped the
/// listener.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<HarvestEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HarvestEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn emit(&self, event: HarvestEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.sender.send(event);
    }
}

impl Listener for ChannelListener {
    fn on_started(&self) {
        self.emit(HarvestEvent::Started);
    }

    fn on_success(&self, reference: &DataReference) {
        self.emit(HarvestEvent::Success(reference.clone()));
    }

    fn on_error(&self, error: &HarvestError) {
        self.emit(HarvestEvent::Error(error.to_string()));
    }

    fn on_completed(&self) {
        self.emit(HarvestEvent::Completed);
    }
}
