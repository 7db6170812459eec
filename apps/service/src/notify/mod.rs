//! Owner notifications for status transitions.
//!
//! Delivery is best effort. The dispatcher logs and then drops whatever error
//! a sink returns; a check is never failed because an alert could not be sent.

mod webhook;

pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::database::models::Endpoint;
use crate::monitoring::transition::Transition;
use crate::monitoring::types::CheckResult;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// No contact is known for this owner, the alert is dropped
    #[error("no contact configured for owner {0}")]
    UnknownOwner(i64),

    #[error("failed to deliver alert: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("alert rejected with HTTP status {0}")]
    Rejected(u16),
}

/// Receives status transitions, keyed by endpoint owner
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_down(&self, owner_id: i64, endpoint: &Endpoint, check: &CheckResult) -> Result<(), NotifyError>;

    async fn notify_up(&self, owner_id: i64, endpoint: &Endpoint, check: &CheckResult) -> Result<(), NotifyError>;
}

/// Rendered alert, shared by every sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainAlert {
    pub event: &'static str,
    pub subject: String,
    pub owner_id: i64,
    pub domain_id: i64,
    pub hostname: String,
    pub check_id: Option<i64>,
    pub result: &'static str,
    pub label: &'static str,
    pub response_code: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl DomainAlert {
    pub fn new(transition: Transition, owner_id: i64, endpoint: &Endpoint, check: &CheckResult) -> Self {
        let (event, subject) = match transition {
            Transition::WentDown => ("domain.down", format!("Domain Down: {}", endpoint.hostname)),
            Transition::Recovered => ("domain.up", format!("Domain Recovered: {}", endpoint.hostname)),
        };

        Self {
            event,
            subject,
            owner_id,
            domain_id: endpoint.id,
            hostname: endpoint.hostname.clone(),
            check_id: check.id,
            result: check.kind.as_str(),
            label: check.kind.label(),
            response_code: check.response_code,
            response_time_ms: check.response_time_ms,
            error_message: check.error_message.clone(),
            checked_at: check.checked_at,
        }
    }

    /// Plain text body, one fact per line
    pub fn body(&self) -> String {
        let mut lines = Vec::new();
        match self.event {
            "domain.down" => {
                lines.push(format!("Your domain {} is currently unreachable.", self.hostname));
                lines.push(format!("Status: {}", self.label));
            }
            _ => lines.push(format!("Your domain {} is back online.", self.hostname)),
        }
        if let Some(error) = &self.error_message {
            lines.push(format!("Error: {error}"));
        }
        if let Some(code) = self.response_code {
            lines.push(format!("Response Code: {code}"));
        }
        if let Some(ms) = self.response_time_ms {
            lines.push(format!("Response Time: {ms}ms"));
        }
        lines.push(format!("Checked at: {} UTC", self.checked_at.format("%Y-%m-%d %H:%M:%S")));
        lines.join("\n")
    }
}

/// Writes alerts to the log. Every owner resolves.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_down(&self, owner_id: i64, endpoint: &Endpoint, check: &CheckResult) -> Result<(), NotifyError> {
        let alert = DomainAlert::new(Transition::WentDown, owner_id, endpoint, check);
        warn!(owner_id, domain_id = endpoint.id, "{}\n{}", alert.subject, alert.body());
        Ok(())
    }

    async fn notify_up(&self, owner_id: i64, endpoint: &Endpoint, check: &CheckResult) -> Result<(), NotifyError> {
        let alert = DomainAlert::new(Transition::Recovered, owner_id, endpoint, check);
        info!(owner_id, domain_id = endpoint.id, "{}\n{}", alert.subject, alert.body());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::HttpMethod;
    use crate::monitoring::types::CheckKind;

    fn endpoint() -> Endpoint {
        let now = Utc::now();
        Endpoint {
            id: 3,
            hostname: "example.com".into(),
            method: HttpMethod::Get,
            interval_seconds: 60,
            timeout_seconds: 30,
            body: None,
            is_active: true,
            last_checked_at: None,
            owner_id: Some(9),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_down_alert_rendering() {
        let check = CheckResult::from_failure(3, CheckKind::DnsError, "dns error: no such host".into(), 12);
        let alert = DomainAlert::new(Transition::WentDown, 9, &endpoint(), &check);

        assert_eq!(alert.event, "domain.down");
        assert_eq!(alert.subject, "Domain Down: example.com");
        assert_eq!(alert.result, "DNS_ERROR");
        let body = alert.body();
        assert!(body.contains("Status: DNS Error"));
        assert!(body.contains("Error: dns error: no such host"));
        assert!(!body.contains("Response Code"));
    }

    #[test]
    fn test_recovered_alert_rendering() {
        let check = CheckResult::from_response(3, 200, true, Some("OK".into()), 85);
        let alert = DomainAlert::new(Transition::Recovered, 9, &endpoint(), &check);

        assert_eq!(alert.subject, "Domain Recovered: example.com");
        let body = alert.body();
        assert!(body.contains("back online"));
        assert!(body.contains("Response Code: 200"));
        assert!(body.contains("Response Time: 85ms"));
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_any_owner() {
        let check = CheckResult::from_response(3, 200, true, None, 1);
        assert!(LogNotifier.notify_up(12345, &endpoint(), &check).await.is_ok());
        assert!(LogNotifier.notify_down(1, &endpoint(), &check).await.is_ok());
    }
}
