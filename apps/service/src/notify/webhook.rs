use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{DomainAlert, NotificationSink, NotifyError};
use crate::database::models::Endpoint;
use crate::monitoring::transition::Transition;
use crate::monitoring::types::CheckResult;

/// Posts alerts as JSON to a per-owner webhook URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhooks: HashMap<i64, String>,
}

impl WebhookNotifier {
    pub fn new(webhooks: HashMap<i64, String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, webhooks })
    }

    async fn deliver(&self, alert: DomainAlert) -> Result<(), NotifyError> {
        let url = self
            .webhooks
            .get(&alert.owner_id)
            .ok_or(NotifyError::UnknownOwner(alert.owner_id))?;

        let response = self.client.post(url).json(&alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!(owner_id = alert.owner_id, event = alert.event, "Webhook alert delivered");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify_down(&self, owner_id: i64, endpoint: &Endpoint, check: &CheckResult) -> Result<(), NotifyError> {
        self.deliver(DomainAlert::new(Transition::WentDown, owner_id, endpoint, check)).await
    }

    async fn notify_up(&self, owner_id: i64, endpoint: &Endpoint, check: &CheckResult) -> Result<(), NotifyError> {
        self.deliver(DomainAlert::new(Transition::Recovered, owner_id, endpoint, check)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::HttpMethod;
    use crate::monitoring::types::CheckKind;
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn endpoint() -> Endpoint {
        let now = Utc::now();
        Endpoint {
            id: 5,
            hostname: "example.com".into(),
            method: HttpMethod::Head,
            interval_seconds: 60,
            timeout_seconds: 30,
            body: None,
            is_active: true,
            last_checked_at: None,
            owner_id: Some(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_unknown_owner_is_reported() {
        let notifier = WebhookNotifier::new(HashMap::new(), Duration::from_secs(1)).unwrap();
        let check = CheckResult::from_failure(5, CheckKind::Fail, "refused".into(), 3);

        let err = notifier.notify_down(77, &endpoint(), &check).await.unwrap_err();
        assert!(matches!(err, NotifyError::UnknownOwner(77)));
    }

    #[tokio::test]
    async fn test_alert_is_posted_as_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            // Read until the JSON body has arrived
            while !String::from_utf8_lossy(&received).contains("}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&received).to_string()
        });

        let webhooks = HashMap::from([(1, format!("http://{addr}/hook"))]);
        let notifier = WebhookNotifier {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            webhooks,
        };
        let check = CheckResult::from_failure(5, CheckKind::SslError, "certificate expired".into(), 40);

        notifier.notify_down(1, &endpoint(), &check).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook HTTP/1.1"));
        assert!(request.contains("\"event\":\"domain.down\""));
        assert!(request.contains("\"result\":\"SSL_ERROR\""));
    }
}
