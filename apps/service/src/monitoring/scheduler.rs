use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::database::models::Endpoint;
use crate::orchestrator::{DispatchMode, Orchestrator};

/// Whether `endpoint` should be probed at `now`
pub fn is_due(endpoint: &Endpoint, now: DateTime<Utc>) -> bool {
    if !endpoint.is_active {
        return false;
    }

    match endpoint.last_checked_at {
        None => true,
        Some(last_checked_at) => {
            now - last_checked_at >= ChronoDuration::seconds(endpoint.interval_seconds as i64)
        }
    }
}

/// Due set for a snapshot of endpoints, ordered by id
pub fn select_due(now: DateTime<Utc>, endpoints: &[Endpoint]) -> Vec<Endpoint> {
    let mut due: Vec<Endpoint> = endpoints.iter().filter(|e| is_due(e, now)).cloned().collect();
    due.sort_by_key(|e| e.id);
    due
}

/// Cadence trigger - asks the orchestrator for a due-set dispatch on every tick
pub struct MonitoringScheduler {
    orchestrator: Arc<Orchestrator>,
    cadence: Duration,
}

impl MonitoringScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, cadence: Duration) -> Self {
        Self { orchestrator, cadence }
    }

    /// Tick until `shutdown` flips to true.
    ///
    /// The due set is recomputed from the repository on every tick, so
    /// endpoints created or reactivated in between are picked up on the next
    /// pass.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.cadence);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Scheduler started, dispatching due domains every {:?}", self.cadence);

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                match self.orchestrator.dispatch(DispatchMode::Due).await {
                    Ok(report) if report.is_empty() => debug!("No domains need checking"),
                    Ok(report) => {
                        info!(
                            "Dispatch pass: {} queued, {} skipped, {} failed",
                            report.queued(),
                            report.skipped(),
                            report.failed()
                        );
                    }
                    Err(e) => error!("Dispatch pass failed: {e:#}"),
                }
            }

            warn!("Scheduler stopped");
        })
    }
}
