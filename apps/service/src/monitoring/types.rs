use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Classified outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckKind {
    Success,
    Fail,
    Timeout,
    DnsError,
    SslError,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Success,
        CheckKind::Fail,
        CheckKind::Timeout,
        CheckKind::DnsError,
        CheckKind::SslError,
    ];

    /// Stable identifier used for storage
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Success => "SUCCESS",
            CheckKind::Fail => "FAIL",
            CheckKind::Timeout => "TIMEOUT",
            CheckKind::DnsError => "DNS_ERROR",
            CheckKind::SslError => "SSL_ERROR",
        }
    }

    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            CheckKind::Success => "Success",
            CheckKind::Fail => "Failed",
            CheckKind::Timeout => "Timeout",
            CheckKind::DnsError => "DNS Error",
            CheckKind::SslError => "SSL Error",
        }
    }

    /// Badge color used by dashboards
    pub fn color(self) -> &'static str {
        match self {
            CheckKind::Success => "green",
            CheckKind::Fail => "red",
            CheckKind::Timeout => "orange",
            CheckKind::DnsError => "purple",
            CheckKind::SslError => "yellow",
        }
    }

    pub fn is_successful(self) -> bool {
        matches!(self, CheckKind::Success)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown check result kind: {0}")]
pub struct UnknownCheckKind(pub String);

impl FromStr for CheckKind {
    type Err = UnknownCheckKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownCheckKind(s.to_string()))
    }
}

/// Result of a monitoring check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Row id, `None` until the history store has appended the record
    pub id: Option<i64>,

    /// Endpoint this result belongs to
    pub endpoint_id: i64,

    pub kind: CheckKind,

    /// HTTP status code, only when a response was received
    pub response_code: Option<u16>,

    /// Elapsed wall-clock time of the probe in milliseconds
    pub response_time_ms: Option<u64>,

    /// Diagnostic message, set for every non-success kind
    pub error_message: Option<String>,

    /// Completion time of the probe
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    /// Result for a probe that received a response
    pub fn from_response(
        endpoint_id: i64,
        status_code: u16,
        successful: bool,
        reason: Option<String>,
        elapsed_ms: u64,
    ) -> Self {
        let kind = if successful { CheckKind::Success } else { CheckKind::Fail };
        Self {
            id: None,
            endpoint_id,
            kind,
            response_code: Some(status_code),
            response_time_ms: Some(elapsed_ms),
            error_message: (!successful)
                .then(|| reason.unwrap_or_else(|| format!("HTTP status {status_code}"))),
            checked_at: Utc::now(),
        }
    }

    /// Result for a probe whose transport failed before a response
    pub fn from_failure(endpoint_id: i64, kind: CheckKind, message: String, elapsed_ms: u64) -> Self {
        Self {
            id: None,
            endpoint_id,
            kind,
            response_code: None,
            response_time_ms: Some(elapsed_ms),
            error_message: Some(message),
            checked_at: Utc::now(),
        }
    }

    /// Override the completion time
    pub fn at(mut self, checked_at: DateTime<Utc>) -> Self {
        self.checked_at = checked_at;
        self
    }

    pub fn is_up(&self) -> bool {
        self.kind.is_successful()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_storage_name() {
        for kind in CheckKind::ALL {
            assert_eq!(kind.as_str().parse::<CheckKind>(), Ok(kind));
        }
        assert!("DEGRADED".parse::<CheckKind>().is_err());
    }

    #[test]
    fn test_only_success_is_successful() {
        let successful: Vec<_> = CheckKind::ALL.into_iter().filter(|k| k.is_successful()).collect();
        assert_eq!(successful, vec![CheckKind::Success]);
    }

    #[test]
    fn test_labels_and_colors() {
        assert_eq!(CheckKind::DnsError.label(), "DNS Error");
        assert_eq!(CheckKind::Fail.label(), "Failed");
        assert_eq!(CheckKind::Timeout.color(), "orange");
        assert_eq!(CheckKind::SslError.color(), "yellow");
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let err = "UP".parse::<CheckKind>().unwrap_err();
        assert_eq!(err, UnknownCheckKind("UP".into()));
        assert_eq!(err.to_string(), "unknown check result kind: UP");

        let source: &dyn std::error::Error = &err;
        assert!(source.source().is_none());
    }

    #[test]
    fn test_serde_uses_storage_names() {
        let json = serde_json::to_string(&CheckKind::DnsError).unwrap();
        assert_eq!(json, "\"DNS_ERROR\"");
    }

    #[test]
    fn test_failed_response_keeps_reason() {
        let ok = CheckResult::from_response(1, 200, true, Some("OK".into()), 12);
        assert_eq!(ok.kind, CheckKind::Success);
        assert!(ok.error_message.is_none());

        let err = CheckResult::from_response(1, 503, false, Some("Service Unavailable".into()), 12);
        assert_eq!(err.kind, CheckKind::Fail);
        assert_eq!(err.response_code, Some(503));
        assert_eq!(err.error_message.as_deref(), Some("Service Unavailable"));
    }
}
