/// Orchestrator module - turns a dispatch request into per-endpoint checks
///
/// A dispatch resolves its batch from the endpoint repository (the due set,
/// every active endpoint, or a single endpoint) and hands it to a
/// `CheckRunner`. Each endpoint then goes through the `CheckPipeline`
/// independently: one endpoint failing never affects the rest of the batch.
pub mod pipeline;
pub mod registration;
pub mod runner;


pub use pipeline::{CheckPipeline, CheckedEndpoint, InFlightGuard};
pub use registration::EndpointError;
pub use runner::{CheckRunner, InlineRunner, QueuedRunner};

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::database::EndpointRepository;
use crate::database::models::Endpoint;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Domain with ID {0} not found")]
    EndpointNotFound(i64),

    #[error("A check for domain {0} is already in flight")]
    InFlight(i64),

    #[error("History store failed: {0:#}")]
    History(anyhow::Error),

    #[error("Domain repository failed: {0:#}")]
    Repository(anyhow::Error),

    #[error("Check queue is closed")]
    QueueClosed,

    #[error("Check task aborted: {0}")]
    Aborted(String),
}

/// Which endpoints a dispatch covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Active endpoints whose interval has elapsed
    Due,
    /// Every active endpoint, due or not
    All,
    /// One endpoint by id, active or not
    One(i64),
}

#[derive(Debug)]
pub enum OutcomeStatus {
    /// Ran to completion in this dispatch
    Checked(CheckedEndpoint),
    /// Handed to the background queue
    Queued,
    /// A probe for this endpoint was already in flight
    Skipped,
    Failed(DispatchError),
}

#[derive(Debug)]
pub struct EndpointOutcome {
    pub endpoint_id: i64,
    pub hostname: String,
    pub status: OutcomeStatus,
}

impl EndpointOutcome {
    pub fn new(endpoint: &Endpoint, status: OutcomeStatus) -> Self {
        Self {
            endpoint_id: endpoint.id,
            hostname: endpoint.hostname.clone(),
            status,
        }
    }
}

/// Per-endpoint outcomes of one dispatch
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<EndpointOutcome>,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn checked(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Checked(_)))
    }

    pub fn queued(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Queued))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed(_)))
    }

    pub fn outcome(&self, endpoint_id: i64) -> Option<&EndpointOutcome> {
        self.outcomes.iter().find(|o| o.endpoint_id == endpoint_id)
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Dispatch coordinator shared by the scheduler and the CLI
pub struct Orchestrator {
    endpoints: Arc<dyn EndpointRepository>,
    pipeline: Arc<CheckPipeline>,
    runner: Arc<dyn CheckRunner>,
}

impl Orchestrator {
    pub fn new(
        endpoints: Arc<dyn EndpointRepository>,
        pipeline: Arc<CheckPipeline>,
        runner: Arc<dyn CheckRunner>,
    ) -> Self {
        Self { endpoints, pipeline, runner }
    }

    pub fn endpoints(&self) -> &Arc<dyn EndpointRepository> {
        &self.endpoints
    }

    /// Resolve the batch for `mode` and hand it to the runner.
    ///
    /// Errors only when the batch itself cannot be resolved. Per-endpoint
    /// failures are reported in the returned outcomes.
    pub async fn dispatch(&self, mode: DispatchMode) -> Result<DispatchReport, DispatchError> {
        let batch = self.resolve(mode).await?;
        if batch.is_empty() {
            debug!(?mode, "Nothing to dispatch");
            return Ok(DispatchReport::default());
        }

        info!(?mode, "Dispatching checks for {} domains", batch.len());
        let outcomes = self.runner.run(batch).await;
        Ok(DispatchReport { outcomes })
    }

    /// Probe one endpoint on the calling task and return the stored result
    pub async fn check_now(&self, endpoint_id: i64) -> Result<CheckedEndpoint, DispatchError> {
        let endpoint = self.load(endpoint_id).await?;
        self.pipeline.run(&endpoint).await
    }

    async fn resolve(&self, mode: DispatchMode) -> Result<Vec<Endpoint>, DispatchError> {
        match mode {
            DispatchMode::Due => self
                .endpoints
                .due_endpoints(Utc::now())
                .await
                .map_err(DispatchError::Repository),
            DispatchMode::All => self.endpoints.active_endpoints().await.map_err(DispatchError::Repository),
            DispatchMode::One(id) => Ok(vec![self.load(id).await?]),
        }
    }

    async fn load(&self, endpoint_id: i64) -> Result<Endpoint, DispatchError> {
        self.endpoints
            .get_endpoint(endpoint_id)
            .await
            .map_err(DispatchError::Repository)?
            .ok_or(DispatchError::EndpointNotFound(endpoint_id))
    }
}
