use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Mutex;
use std::time::Duration;

use crate::database::models::HttpMethod;

use super::types::CheckKind;

const USER_AGENT: &str = concat!("domain-monitor/", env!("CARGO_PKG_VERSION"));

/// One outgoing probe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub url: String,
    pub method: HttpMethod,
    /// Applies to the connect phase and to the request as a whole
    pub timeout: Duration,
}

/// A response was received, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub successful: bool,
    pub reason: Option<String>,
}

impl ProbeResponse {
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        Self {
            status_code: status.as_u16(),
            successful: status.is_success(),
            reason: status.canonical_reason().map(str::to_string),
        }
    }
}

/// The transport failed before any response was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Set when the client itself reports a time limit as the cause
    pub timed_out: bool,
    pub message: String,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { timed_out: false, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { timed_out: true, message: message.into() }
    }

    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let timed_out = error.is_timeout();
        // The url may contain words like "ssl" or "timeout", keep it out of the text we match on
        let error = error.without_url();
        Self { timed_out, message: error_chain(&error) }
    }

    /// Map the failure onto the result taxonomy, first match wins
    pub fn classify(&self) -> CheckKind {
        if self.timed_out {
            return CheckKind::Timeout;
        }
        classify_message(&self.message)
    }
}

const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout", "deadline has elapsed"];
const DNS_MARKERS: &[&str] = &[
    "could not resolve",
    "dns error",
    "failed to lookup address",
    "getaddrinfo",
    "name or service not known",
    "nodename nor servname",
    "no such host",
    "name resolution",
];
const TLS_MARKERS: &[&str] = &["certificate", "ssl", "tls"];

/// Message inspection fallback for clients without structured error categories
pub fn classify_message(message: &str) -> CheckKind {
    let message = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| message.contains(marker));

    if contains_any(TIMEOUT_MARKERS) {
        CheckKind::Timeout
    } else if contains_any(DNS_MARKERS) {
        CheckKind::DnsError
    } else if contains_any(TLS_MARKERS) {
        CheckKind::SslError
    } else {
        CheckKind::Fail
    }
}

/// Render an error and all of its sources as `outer: inner: root`
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }

    message
}

/// Sends probe requests over some transport
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform exactly one request, no retries
    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransportFailure>;
}

/// reqwest backed checker with certificate validation enabled
pub struct HttpChecker {
    // Connect timeouts are client-wide, so keep one client per timeout value
    clients: Mutex<HashMap<Duration, reqwest::Client>>,
    use_system_proxy: bool,
}

impl Default for HttpChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpChecker {
    pub fn new() -> Self {
        Self { clients: Mutex::new(HashMap::new()), use_system_proxy: true }
    }

    /// Checker that ignores `HTTP(S)_PROXY` and always connects directly
    pub fn direct() -> Self {
        Self { use_system_proxy: false, ..Self::new() }
    }

    fn client_for(&self, timeout: Duration) -> Result<reqwest::Client, TransportFailure> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| TransportFailure::new("HTTP client cache poisoned"))?;

        if let Some(client) = clients.get(&timeout) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT);
        if !self.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(TransportFailure::from_reqwest)?;

        clients.insert(timeout, client.clone());
        Ok(client)
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, TransportFailure> {
        let client = self.client_for(request.timeout)?;
        let method = request.method;
        let pending = async {
            let response = client.request(method.into(), request.url.as_str()).send().await?;
            let probe = ProbeResponse::from_status(response.status());
            // A GET is complete once its body has arrived, so the timing and the timeout cover it too
            if method == HttpMethod::Get {
                response.bytes().await?;
            }
            Ok::<_, reqwest::Error>(probe)
        };

        // reqwest enforces the same limit, the outer bound only guards against a hang inside the stack
        match tokio::time::timeout(request.timeout, pending).await {
            Ok(Ok(probe)) => Ok(probe),
            Ok(Err(e)) => Err(TransportFailure::from_reqwest(e)),
            Err(_) => Err(TransportFailure::timeout(format!(
                "Request timed out after {} seconds",
                request.timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_messages() {
        assert_eq!(classify_message("Connection timed out"), CheckKind::Timeout);
        assert_eq!(classify_message("operation timeout"), CheckKind::Timeout);
        assert_eq!(classify_message("deadline has elapsed"), CheckKind::Timeout);
    }

    #[test]
    fn test_dns_messages() {
        assert_eq!(classify_message("Could not resolve host"), CheckKind::DnsError);
        assert_eq!(
            classify_message(
                "error sending request: client error (Connect): dns error: failed to lookup address information: Name or service not known"
            ),
            CheckKind::DnsError
        );
    }

    #[test]
    fn test_tls_messages() {
        assert_eq!(
            classify_message("error:0A000086:SSL routines:tls_post_process_server_certificate:certificate verify failed"),
            CheckKind::SslError
        );
        assert_eq!(classify_message("invalid peer certificate: Expired"), CheckKind::SslError);
    }

    #[test]
    fn test_first_match_wins() {
        // A timed out TLS handshake is a timeout
        assert_eq!(classify_message("TLS handshake timed out"), CheckKind::Timeout);
        assert_eq!(classify_message("dns error: certificate"), CheckKind::DnsError);
    }

    #[test]
    fn test_other_failures() {
        assert_eq!(classify_message("Connection refused (os error 111)"), CheckKind::Fail);
        assert_eq!(classify_message(""), CheckKind::Fail);
    }

    #[test]
    fn test_structured_timeout_flag_wins() {
        let failure = TransportFailure::timeout("operation was aborted");
        assert_eq!(failure.classify(), CheckKind::Timeout);
        assert_eq!(TransportFailure::new("Connection reset by peer").classify(), CheckKind::Fail);
    }

    #[test]
    fn test_response_from_status() {
        let ok = ProbeResponse::from_status(reqwest::StatusCode::NO_CONTENT);
        assert!(ok.successful);
        let err = ProbeResponse::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.successful);
        assert_eq!(err.reason.as_deref(), Some("Internal Server Error"));
        // Redirects that were not followed are not successful
        assert!(!ProbeResponse::from_status(reqwest::StatusCode::FOUND).successful);
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let wrapped = Wrapper(std::io::Error::other("root cause"));
        assert_eq!(error_chain(&wrapped), "wrapped: root cause");
    }

    #[derive(Debug)]
    struct Wrapper(std::io::Error);

    impl std::fmt::Display for Wrapper {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("wrapped")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }
}
