//! Engine façade.
//!
//! The [`Engine`] owns three concurrent tables:
//! - connectors, keyed by direction and type key
//! - registered brokers ([`BrokerInfo`]), keyed by id
//! - running jobs, keyed by [`JobId`]; entries leave the table when the job
//!   completes
//!
//! It performs no iteration itself: it resolves definitions to brokers and
//! hands them to a [`Processor`].

use crate::config::HarvesterConfig;
use crate::executor::{DefaultProcessor, Handler, Processor, ProcessorError};
use crate::harvest::formats::{ConsoleConnector, FolderInputConnector, FolderOutputConnector};
use crate::harvest::{ConnectorRegistry, ConnectorTemplate, InvalidDefinition};
use crate::model::{BrokerInfo, Category, DataReference, EntityDefinition, JobId};
use crate::traits::{HarvestError, InputBroker, Listener, OutputBroker};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No {category} connector registered for '{type_key}'")]
    UnknownConnector { category: Category, type_key: String },
    #[error("Broker {id} is {actual}, expected {expected}")]
    CategoryMismatch {
        id: Uuid,
        expected: Category,
        actual: Category,
    },
    #[error("Unknown broker: {0}")]
    UnknownBroker(Uuid),
    #[error(transparent)]
    InvalidDefinition(#[from] InvalidDefinition),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

type JobTable = DashMap<JobId, Arc<Handler>>;

pub struct Engine {
    connectors: Arc<ConnectorRegistry>,
    processor: Arc<dyn Processor>,
    brokers: DashMap<Uuid, BrokerInfo>,
    jobs: Arc<JobTable>,
}

impl Engine {
    pub fn new(connectors: Arc<ConnectorRegistry>, processor: Arc<dyn Processor>) -> Self {
        Self {
            connectors,
            processor,
            brokers: DashMap::new(),
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Engine with the bundled `FOLDER` and `CONSOLE` connectors and the
    /// default processor.
    pub fn with_default_connectors() -> Self {
        let connectors = ConnectorRegistry::new();
        connectors.register_input(Arc::new(FolderInputConnector::new()));
        connectors.register_output(Arc::new(FolderOutputConnector));
        connectors.register_output(Arc::new(ConsoleConnector));
        Self::new(Arc::new(connectors), Arc::new(DefaultProcessor::new()))
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn templates(&self, category: Category) -> Vec<ConnectorTemplate> {
        self.connectors.templates(category)
    }

    // ------------------------------------------------------------------
    // Broker registry
    // ------------------------------------------------------------------

    /// Registers a broker definition under a fresh id.
    ///
    /// The definition is checked against its connector's template (no I/O),
    /// so a registered broker is known to be buildable.
    pub fn register_broker(
        &self,
        category: Category,
        definition: EntityDefinition,
    ) -> Result<BrokerInfo, EngineError> {
        self.insert_broker(Uuid::new_v4(), category, definition)
    }

    fn insert_broker(
        &self,
        id: Uuid,
        category: Category,
        definition: EntityDefinition,
    ) -> Result<BrokerInfo, EngineError> {
        let template = match category {
            Category::Inbound => self
                .connectors
                .input(&definition.type_key)
                .map(|c| c.template()),
            Category::Outbound => self
                .connectors
                .output(&definition.type_key)
                .map(|c| c.template()),
        }
        .ok_or_else(|| EngineError::UnknownConnector {
            category,
            type_key: definition.type_key.clone(),
        })?;
        template.validate(&definition)?;

        let info = BrokerInfo::new(id, category, definition);
        self.brokers.insert(id, info.clone());
        info!(
            broker = %id,
            category = %category,
            connector = %info.definition().type_key,
            "Registered broker"
        );
        Ok(info)
    }

    pub fn find_broker(&self, id: Uuid) -> Option<BrokerInfo> {
        self.brokers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn list_brokers(&self, category: Category) -> Vec<BrokerInfo> {
        self.brokers
            .iter()
            .filter(|entry| entry.category() == category)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn remove_broker(&self, id: Uuid) -> Option<BrokerInfo> {
        self.brokers.remove(&id).map(|(_, info)| info)
    }

    /// Registers every broker listed in `config`.
    pub fn load_config(&self, config: &HarvesterConfig) -> Result<Vec<BrokerInfo>, EngineError> {
        config
            .brokers
            .iter()
            .map(|entry| {
                self.insert_broker(
                    entry.id.unwrap_or_else(Uuid::new_v4),
                    entry.category,
                    entry.definition.clone(),
                )
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Builds the brokers for `input` and `outputs` and starts a job.
    ///
    /// # Errors
    ///
    /// Fails before any job exists when a broker has the wrong category, its
    /// connector is unknown, or its definition is invalid.
    #[instrument(skip_all, fields(input = %input.id()))]
    pub fn submit(
        &self,
        input: &BrokerInfo,
        outputs: &[BrokerInfo],
        listener: Arc<dyn Listener>,
    ) -> Result<(JobId, Arc<Handler>), EngineError> {
        let source = self.build_input(input)?;
        let destinations = outputs
            .iter()
            .map(|info| self.build_output(info))
            .collect::<Result<Vec<_>, _>>()?;

        let id = JobId::new();
        let listener = Arc::new(JobListener {
            id,
            inner: listener,
            jobs: Arc::downgrade(&self.jobs),
        });
        let handler = Arc::new(self.processor.initialize(source, destinations, listener));

        self.jobs.insert(id, Arc::clone(&handler));
        if let Err(error) = handler.begin() {
            self.jobs.remove(&id);
            return Err(error.into());
        }

        info!(job = %id, harvest = %handler.description(), "Submitted job");
        Ok((id, handler))
    }

    /// [`submit`](Engine::submit) with registered broker ids.
    pub fn submit_by_id(
        &self,
        input: Uuid,
        outputs: &[Uuid],
        listener: Arc<dyn Listener>,
    ) -> Result<(JobId, Arc<Handler>), EngineError> {
        let input = self.find_broker(input).ok_or(EngineError::UnknownBroker(input))?;
        let outputs = outputs
            .iter()
            .map(|id| self.find_broker(*id).ok_or(EngineError::UnknownBroker(*id)))
            .collect::<Result<Vec<_>, _>>()?;
        self.submit(&input, &outputs, listener)
    }

    pub fn job(&self, id: JobId) -> Option<Arc<Handler>> {
        self.jobs.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn active_jobs(&self) -> Vec<JobId> {
        self.jobs.iter().map(|entry| *entry.key()).collect()
    }

    /// Requests cancellation of a running job. `false` when no such job runs.
    pub fn abort_job(&self, id: JobId) -> bool {
        match self.job(id) {
            Some(handler) => {
                info!(job = %id, "Aborting job");
                handler.abort();
                true
            }
            None => false,
        }
    }

    /// Aborts every running job without waiting for any of them.
    ///
    /// Workers still close their brokers when they observe the request; if
    /// the runtime goes away first the brokers are dropped with the task.
    pub fn shutdown(&self) {
        let ids = self.active_jobs();
        if !ids.is_empty() {
            warn!(jobs = ids.len(), "Shutting down with running jobs");
        }
        for id in ids {
            self.abort_job(id);
        }
    }

    fn build_input(&self, info: &BrokerInfo) -> Result<Box<dyn InputBroker>, EngineError> {
        expect_category(info, Category::Inbound)?;
        let type_key = &info.definition().type_key;
        let connector = self
            .connectors
            .input(type_key)
            .ok_or_else(|| EngineError::UnknownConnector {
                category: Category::Inbound,
                type_key: type_key.clone(),
            })?;
        Ok(connector.create_broker(info.definition())?)
    }

    fn build_output(&self, info: &BrokerInfo) -> Result<Box<dyn OutputBroker>, EngineError> {
        expect_category(info, Category::Outbound)?;
        let type_key = &info.definition().type_key;
        let connector = self
            .connectors
            .output(type_key)
            .ok_or_else(|| EngineError::UnknownConnector {
                category: Category::Outbound,
                type_key: type_key.clone(),
            })?;
        Ok(connector.create_broker(info.definition())?)
    }
}

fn expect_category(info: &BrokerInfo, expected: Category) -> Result<(), EngineError> {
    if info.category() != expected {
        return Err(EngineError::CategoryMismatch {
            id: info.id(),
            expected,
            actual: info.category(),
        });
    }
    Ok(())
}

/// Forwards to the caller's listener and drops the job from the table on
/// completion.
struct JobListener {
    id: JobId,
    inner: Arc<dyn Listener>,
    jobs: Weak<JobTable>,
}

impl Listener for JobListener {
    fn on_started(&self) {
        self.inner.on_started();
    }

    fn on_success(&self, reference: &DataReference) {
        self.inner.on_success(reference);
    }

    fn on_error(&self, error: &HarvestError) {
        self.inner.on_error(error);
    }

    fn on_completed(&self) {
        if let Some(jobs) = self.jobs.upgrade() {
            jobs.remove(&self.id);
        }
        info!(job = %self.id, "Job finished");
        self.inner.on_completed();
    }
}
