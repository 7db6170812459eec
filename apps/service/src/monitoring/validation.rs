//! Input validation for endpoint registration.

use anyhow::{Result, anyhow};
use url::Url;

use super::executor::normalize_target;
use crate::database::models::HttpMethod;

pub const MIN_INTERVAL_SECONDS: u64 = 10;
pub const MAX_INTERVAL_SECONDS: u64 = 86_400;
pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 120;
pub const MAX_HOSTNAME_LEN: usize = 255;

/// Validate a hostname (or full URL) as it will be probed
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return Err(anyhow!("Hostname cannot be empty"));
    }
    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(anyhow!(
            "Hostname too long: {} characters (maximum: {MAX_HOSTNAME_LEN})",
            hostname.len()
        ));
    }

    if let Some((scheme, _)) = hostname.split_once("://") {
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(anyhow!("Invalid scheme '{scheme}'. Must be http or https"));
        }
    }

    let url = Url::parse(&normalize_target(hostname)).map_err(|e| anyhow!("Invalid hostname '{hostname}': {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme '{other}'. Must be http or https")),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(anyhow!("Hostname '{hostname}' has no valid host")),
    }
}

pub fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    if interval_seconds < MIN_INTERVAL_SECONDS {
        return Err(anyhow!(
            "Check interval too short: {interval_seconds} seconds (minimum: {MIN_INTERVAL_SECONDS})"
        ));
    }

    if interval_seconds > MAX_INTERVAL_SECONDS {
        return Err(anyhow!(
            "Check interval too long: {interval_seconds} seconds (maximum: {MAX_INTERVAL_SECONDS})"
        ));
    }

    Ok(())
}

pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    if timeout_seconds < MIN_TIMEOUT_SECONDS {
        return Err(anyhow!(
            "Timeout too short: {timeout_seconds} seconds (minimum: {MIN_TIMEOUT_SECONDS})"
        ));
    }

    if timeout_seconds > MAX_TIMEOUT_SECONDS {
        return Err(anyhow!(
            "Timeout too long: {timeout_seconds} seconds (maximum: {MAX_TIMEOUT_SECONDS})"
        ));
    }

    Ok(())
}

/// Parse a probe method, GET and HEAD only
pub fn parse_method(method: &str) -> Result<HttpMethod> {
    Ok(method.trim().parse::<HttpMethod>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hostname() {
        assert!(validate_hostname("example.com").is_ok());
        assert!(validate_hostname("https://example.com/health").is_ok());
        assert!(validate_hostname("HTTP://example.com:8080").is_ok());

        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("   ").is_err());
        assert!(validate_hostname("ftp://example.com").is_err());
        assert!(validate_hostname("exa mple.com").is_err());
        assert!(validate_hostname(&format!("{}.com", "a".repeat(260))).is_err());
    }

    #[test]
    fn test_validate_check_interval() {
        assert!(validate_check_interval(10).is_ok());
        assert!(validate_check_interval(60).is_ok());
        assert!(validate_check_interval(86_400).is_ok());

        assert!(validate_check_interval(9).is_err());
        assert!(validate_check_interval(86_401).is_err());
    }

    #[test]
    fn test_validate_timeout() {
        assert!(validate_timeout(1).is_ok());
        assert!(validate_timeout(120).is_ok());

        assert!(validate_timeout(0).is_err());
        assert!(validate_timeout(121).is_err());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get").unwrap(), HttpMethod::Get);
        assert_eq!(parse_method(" HEAD ").unwrap(), HttpMethod::Head);
        assert!(parse_method("POST").is_err());
    }
}
