use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::database::models::Endpoint;

use super::checker::{Checker, HttpChecker, ProbeRequest};
use super::types::CheckResult;

/// Target URL for a hostname.
///
/// A bare hostname gets `https://`, an explicit `http://` or `https://` is
/// kept verbatim and never upgraded.
pub fn normalize_target(hostname: &str) -> String {
    let lower = hostname.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        hostname.to_string()
    } else {
        format!("https://{hostname}")
    }
}

/// Probe executor - runs one probe and classifies the outcome
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
}

impl MonitoringExecutor {
    pub fn new(checker: Arc<dyn Checker>) -> Self {
        Self { checker }
    }

    /// Executor backed by the real HTTP client
    pub fn http(use_system_proxy: bool) -> Self {
        let checker = if use_system_proxy { HttpChecker::new() } else { HttpChecker::direct() };
        Self::new(Arc::new(checker))
    }

    /// Probe `endpoint` exactly once.
    ///
    /// Never fails: transport problems come back as a classified result.
    /// Persisting the result is up to the caller.
    pub async fn execute_check(&self, endpoint: &Endpoint) -> CheckResult {
        let request = ProbeRequest {
            url: normalize_target(&endpoint.hostname),
            method: endpoint.method,
            timeout: Duration::from_secs(endpoint.timeout_seconds),
        };

        let start = Instant::now();
        let outcome = self.checker.send(&request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => CheckResult::from_response(
                endpoint.id,
                response.status_code,
                response.successful,
                response.reason,
                elapsed_ms,
            ),
            Err(failure) => {
                let kind = failure.classify();
                tracing::debug!(
                    endpoint_id = endpoint.id,
                    url = %request.url,
                    %kind,
                    "Probe transport failure: {}",
                    failure.message
                );
                CheckResult::from_failure(endpoint.id, kind, failure.message, elapsed_ms)
            }
        }
    }
}
