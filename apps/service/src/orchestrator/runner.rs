//! Inline and queued execution of a dispatch batch.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use super::pipeline::{CheckPipeline, InFlightGuard};
use super::{DispatchError, EndpointOutcome, OutcomeStatus};
use crate::database::models::Endpoint;

/// Runs the check pipeline for a batch of endpoints
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn run(&self, batch: Vec<Endpoint>) -> Vec<EndpointOutcome>;
}

/// Runs every endpoint's pipeline on its own task and waits for all of them
pub struct InlineRunner {
    pipeline: Arc<CheckPipeline>,
    max_in_flight: usize,
}

impl InlineRunner {
    pub fn new(pipeline: Arc<CheckPipeline>, max_in_flight: usize) -> Self {
        Self { pipeline, max_in_flight: max_in_flight.max(1) }
    }
}

#[async_trait]
impl CheckRunner for InlineRunner {
    async fn run(&self, batch: Vec<Endpoint>) -> Vec<EndpointOutcome> {
        futures::stream::iter(batch)
            .map(|endpoint| {
                let pipeline = Arc::clone(&self.pipeline);
                async move {
                    let Some(guard) = pipeline.try_claim(endpoint.id) else {
                        debug!(endpoint_id = endpoint.id, "Check already in flight, skipping");
                        return EndpointOutcome::new(&endpoint, OutcomeStatus::Skipped);
                    };

                    let task = {
                        let endpoint = endpoint.clone();
                        tokio::spawn(async move { pipeline.run_claimed(&endpoint, guard).await })
                    };

                    let status = match task.await {
                        Ok(Ok(checked)) => OutcomeStatus::Checked(checked),
                        Ok(Err(e)) => OutcomeStatus::Failed(e),
                        Err(e) => OutcomeStatus::Failed(DispatchError::Aborted(e.to_string())),
                    };
                    EndpointOutcome::new(&endpoint, status)
                }
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await
    }
}

struct QueuedCheck {
    endpoint: Endpoint,
    guard: InFlightGuard,
}

/// Hands each endpoint to a background worker and returns immediately
pub struct QueuedRunner {
    pipeline: Arc<CheckPipeline>,
    queue: mpsc::Sender<QueuedCheck>,
}

impl QueuedRunner {
    /// Spawn the worker. It exits once every `QueuedRunner` handle is dropped
    /// and the queued checks have finished.
    pub fn start(pipeline: Arc<CheckPipeline>, max_in_flight: usize, capacity: usize) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(Arc::clone(&pipeline), rx, max_in_flight.max(1)));
        (Self { pipeline, queue }, worker)
    }
}

async fn run_worker(pipeline: Arc<CheckPipeline>, mut rx: mpsc::Receiver<QueuedCheck>, max_in_flight: usize) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut tasks = JoinSet::new();

    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let pipeline = Arc::clone(&pipeline);

        tasks.spawn(async move {
            let _permit = permit;
            // Failures are logged by the pipeline, nobody is waiting for them here
            let _ = pipeline.run_claimed(&job.endpoint, job.guard).await;
        });

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                warn!("Queued check task ended abnormally: {e}");
            }
        }
    }

    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            warn!("Queued check task ended abnormally: {e}");
        }
    }
    debug!("Check queue drained");
}

#[async_trait]
impl CheckRunner for QueuedRunner {
    async fn run(&self, batch: Vec<Endpoint>) -> Vec<EndpointOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());

        for endpoint in batch {
            let Some(guard) = self.pipeline.try_claim(endpoint.id) else {
                debug!(endpoint_id = endpoint.id, "Check already in flight, skipping");
                outcomes.push(EndpointOutcome::new(&endpoint, OutcomeStatus::Skipped));
                continue;
            };

            let queued = QueuedCheck { endpoint: endpoint.clone(), guard };
            let status = match self.queue.send(queued).await {
                Ok(()) => OutcomeStatus::Queued,
                Err(_) => OutcomeStatus::Failed(DispatchError::QueueClosed),
            };
            outcomes.push(EndpointOutcome::new(&endpoint, status));
        }

        outcomes
    }
}
