use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// HTTP verb used to probe an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported HTTP method: {0} (allowed: GET, HEAD)")]
pub struct UnsupportedMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            _ => Err(UnsupportedMethod(s.to_string())),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// Endpoint model - a hostname registered for periodic probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i64,
    pub hostname: String,
    pub method: HttpMethod,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub body: Option<String>,
    pub is_active: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when registering a new endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEndpoint {
    pub hostname: String,
    pub method: HttpMethod,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub body: Option<String>,
    pub is_active: bool,
    pub owner_id: Option<i64>,
}

impl NewEndpoint {
    pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            method: HttpMethod::Get,
            interval_seconds: Self::DEFAULT_INTERVAL_SECONDS,
            timeout_seconds: Self::DEFAULT_TIMEOUT_SECONDS,
            body: None,
            is_active: true,
            owner_id: None,
        }
    }

    pub fn owned_by(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }
}

/// Edit of an existing endpoint. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointChanges {
    pub hostname: Option<String>,
    pub method: Option<HttpMethod>,
    pub interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    /// `Some(None)` clears the body
    pub body: Option<Option<String>>,
}

impl EndpointChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `endpoint` with these changes applied
    pub fn apply_to(&self, endpoint: &Endpoint) -> Endpoint {
        let mut updated = endpoint.clone();
        if let Some(hostname) = &self.hostname {
            updated.hostname = hostname.trim().to_string();
        }
        if let Some(method) = self.method {
            updated.method = method;
        }
        if let Some(interval) = self.interval_seconds {
            updated.interval_seconds = interval;
        }
        if let Some(timeout) = self.timeout_seconds {
            updated.timeout_seconds = timeout;
        }
        if let Some(body) = &self.body {
            updated.body = body.clone();
        }
        updated
    }
}

/// Convert a timestamp to unix milliseconds for storage
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert_eq!("HEAD".parse::<HttpMethod>(), Ok(HttpMethod::Head));
        assert!("POST".parse::<HttpMethod>().is_err());
        assert!("DELETE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_unsupported_method_error() {
        let err = "post".parse::<HttpMethod>().unwrap_err();
        assert_eq!(err, UnsupportedMethod("post".into()));
        assert_eq!(err.to_string(), "Unsupported HTTP method: post (allowed: GET, HEAD)");

        let boxed: anyhow::Error = err.into();
        assert!(boxed.downcast_ref::<UnsupportedMethod>().is_some());
    }

    #[test]
    fn test_millis_conversion_keeps_precision() {
        let time = Utc.timestamp_millis_opt(1_767_225_600_123).unwrap();
        assert_eq!(from_millis(to_millis(time)), time);
    }

    #[test]
    fn test_new_endpoint_defaults() {
        let endpoint = NewEndpoint::new("example.com").owned_by(7);
        assert_eq!(endpoint.interval_seconds, 60);
        assert_eq!(endpoint.timeout_seconds, 30);
        assert_eq!(endpoint.method, HttpMethod::Get);
        assert!(endpoint.is_active);
        assert_eq!(endpoint.owner_id, Some(7));
    }

    #[test]
    fn test_changes_keep_unset_fields() {
        let endpoint = Endpoint {
            id: 3,
            hostname: "old.example".into(),
            method: HttpMethod::Get,
            interval_seconds: 60,
            timeout_seconds: 30,
            body: Some("ping".into()),
            is_active: false,
            last_checked_at: None,
            owner_id: Some(1),
            created_at: from_millis(0),
            updated_at: from_millis(0),
        };
        assert!(EndpointChanges::default().is_empty());
        assert_eq!(EndpointChanges::default().apply_to(&endpoint), endpoint);

        let changes = EndpointChanges {
            hostname: Some(" new.example ".into()),
            method: Some(HttpMethod::Head),
            body: Some(None),
            ..Default::default()
        };
        let updated = changes.apply_to(&endpoint);
        assert_eq!(updated.hostname, "new.example");
        assert_eq!(updated.method, HttpMethod::Head);
        assert_eq!(updated.body, None);
        assert_eq!(updated.interval_seconds, 60);
        assert_eq!(updated.owner_id, Some(1));
        assert!(!updated.is_active);
    }
}
