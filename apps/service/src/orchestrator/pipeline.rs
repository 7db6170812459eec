use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::DispatchError;
use crate::database::models::Endpoint;
use crate::database::{EndpointRepository, HistoryStore};
use crate::monitoring::MonitoringExecutor;
use crate::monitoring::transition::{self, StatusEvent, Transition};
use crate::monitoring::types::CheckResult;
use crate::notify::{NotificationSink, NotifyError};

/// Outcome of one endpoint's pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedEndpoint {
    pub check: CheckResult,
    pub transition: Option<Transition>,
    /// False when the result was stored but `last_checked_at` could not be
    /// updated. The endpoint then stays due and is checked again next pass.
    pub marked_checked: bool,
}

/// Marks an endpoint as having a probe in flight until dropped
#[derive(Debug)]
pub struct InFlightGuard {
    endpoint_id: i64,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl InFlightGuard {
    pub fn endpoint_id(&self) -> i64 {
        self.endpoint_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.endpoint_id);
        }
    }
}

/// Per-endpoint check pipeline: probe, persist, mark checked, detect, notify
pub struct CheckPipeline {
    executor: MonitoringExecutor,
    endpoints: Arc<dyn EndpointRepository>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn NotificationSink>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl CheckPipeline {
    pub fn new(
        executor: MonitoringExecutor,
        endpoints: Arc<dyn EndpointRepository>,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            executor,
            endpoints,
            history,
            notifier,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Reserve `endpoint_id` for one probe. `None` if a probe is already in flight.
    pub fn try_claim(&self, endpoint_id: i64) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().ok()?;
        in_flight.insert(endpoint_id).then(|| InFlightGuard {
            endpoint_id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Claim and run in one go
    pub async fn run(&self, endpoint: &Endpoint) -> Result<CheckedEndpoint, DispatchError> {
        let guard = self
            .try_claim(endpoint.id)
            .ok_or(DispatchError::InFlight(endpoint.id))?;
        self.run_claimed(endpoint, guard).await
    }

    /// Run the pipeline for an endpoint that was claimed with `try_claim`
    pub async fn run_claimed(
        &self,
        endpoint: &Endpoint,
        guard: InFlightGuard,
    ) -> Result<CheckedEndpoint, DispatchError> {
        debug_assert_eq!(guard.endpoint_id(), endpoint.id);

        let result = self.check(endpoint).await;
        drop(guard);

        if let Err(e) = &result {
            error!(endpoint_id = endpoint.id, hostname = %endpoint.hostname, "Domain check aborted: {e}");
        }
        result
    }

    async fn check(&self, endpoint: &Endpoint) -> Result<CheckedEndpoint, DispatchError> {
        debug!(endpoint_id = endpoint.id, "Checking domain: {}", endpoint.hostname);

        // Must be read before the new result is appended
        let previous = self.history.latest(endpoint.id).await.map_err(DispatchError::History)?;

        let result = self.executor.execute_check(endpoint).await;

        let stored = self
            .history
            .append(endpoint.id, &result)
            .await
            .map_err(DispatchError::History)?;

        // The stored result is the next run's baseline, a failed timestamp
        // update must not drop this run's transition
        let marked_checked = match self.endpoints.mark_checked(endpoint.id, Utc::now()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(endpoint_id = endpoint.id, "Failed to update last check time: {e:#}");
                false
            }
        };

        let event = transition::detect_event(endpoint, previous.as_ref(), &stored);
        let transition = event.as_ref().map(|e| e.transition);

        info!(
            endpoint_id = endpoint.id,
            kind = %stored.kind,
            response_code = ?stored.response_code,
            response_time_ms = ?stored.response_time_ms,
            "Domain {} check completed",
            endpoint.hostname
        );

        if let Some(event) = event {
            self.notify(event).await;
        }

        Ok(CheckedEndpoint { check: stored, transition, marked_checked })
    }

    /// Hand the transition to the sink. Never fails the pipeline.
    async fn notify(&self, event: StatusEvent) {
        let StatusEvent { transition, endpoint, check } = &event;
        let transition = *transition;
        let Some(owner_id) = endpoint.owner_id else {
            debug!(endpoint_id = endpoint.id, "Domain has no owner, dropping {:?} alert", transition);
            return;
        };

        let delivered = match transition {
            Transition::WentDown => self.notifier.notify_down(owner_id, endpoint, check).await,
            Transition::Recovered => self.notifier.notify_up(owner_id, endpoint, check).await,
        };

        match delivered {
            Ok(()) => debug!(endpoint_id = endpoint.id, owner_id, "Sent {:?} alert", transition),
            Err(NotifyError::UnknownOwner(_)) => {
                debug!(endpoint_id = endpoint.id, owner_id, "Owner has no contact, dropping {:?} alert", transition)
            }
            Err(e) => warn!(endpoint_id = endpoint.id, owner_id, "Failed to send {:?} alert: {e}", transition),
        }
    }
}
