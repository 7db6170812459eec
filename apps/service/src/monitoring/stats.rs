//! Read-side aggregation over the check history.
//!
//! Every function here only reads from the `HistoryStore`, so summaries can
//! be computed while probes are still being appended.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::database::HistoryStore;
use crate::database::models::{Endpoint, HttpMethod};

use super::types::CheckResult;

pub const DEFAULT_WINDOW_HOURS: i64 = 24;
pub const MONTH_WINDOW_HOURS: i64 = 24 * 30;

/// Share of successful checks in percent, two decimals. `None` without data.
pub fn uptime_percentage(checks: &[CheckResult]) -> Option<f64> {
    if checks.is_empty() {
        return None;
    }

    let successful = checks.iter().filter(|c| c.is_up()).count() as f64;
    let percentage = successful / checks.len() as f64 * 100.0;
    Some((percentage * 100.0).round() / 100.0)
}

/// Mean response time over the checks that have one, rounded to whole ms
pub fn average_response_time(checks: &[CheckResult]) -> Option<u64> {
    let (sum, count) = checks
        .iter()
        .filter_map(|c| c.response_time_ms)
        .fold((0u128, 0u128), |(sum, count), ms| (sum + ms as u128, count + 1));

    if count == 0 {
        return None;
    }

    Some((sum as f64 / count as f64).round() as u64)
}

/// Most recent check by `checked_at`
pub fn latest(checks: &[CheckResult]) -> Option<&CheckResult> {
    checks.iter().max_by_key(|c| (c.checked_at, c.id))
}

/// Down iff there is history and the most recent check failed
pub fn is_currently_down(latest: Option<&CheckResult>) -> bool {
    latest.is_some_and(|check| !check.is_up())
}

fn window_start(now: DateTime<Utc>, window_hours: i64) -> DateTime<Utc> {
    now - Duration::hours(window_hours)
}

/// Uptime of `endpoint_id` over the trailing `window_hours`
pub async fn uptime_in_window(
    history: &dyn HistoryStore,
    endpoint_id: i64,
    now: DateTime<Utc>,
    window_hours: i64,
) -> Result<Option<f64>> {
    let checks = history.in_window(endpoint_id, window_start(now, window_hours)).await?;
    Ok(uptime_percentage(&checks))
}

/// Average response time of `endpoint_id` over the trailing `window_hours`
pub async fn avg_response_in_window(
    history: &dyn HistoryStore,
    endpoint_id: i64,
    now: DateTime<Utc>,
    window_hours: i64,
) -> Result<Option<u64>> {
    let checks = history.in_window(endpoint_id, window_start(now, window_hours)).await?;
    Ok(average_response_time(&checks))
}

pub async fn endpoint_is_down(history: &dyn HistoryStore, endpoint_id: i64) -> Result<bool> {
    Ok(is_currently_down(history.latest(endpoint_id).await?.as_ref()))
}

/// Dashboard view of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSummary {
    pub id: i64,
    pub hostname: String,
    pub method: HttpMethod,
    pub interval: u64,
    pub timeout: u64,
    pub is_active: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub is_down: bool,
    pub uptime_24h: Option<f64>,
    pub uptime_30d: Option<f64>,
    pub avg_response_24h: Option<u64>,
    pub latest_check: Option<CheckResult>,
}

/// Build the summary from one 30 day history read
pub async fn summarize(
    history: &dyn HistoryStore,
    endpoint: &Endpoint,
    now: DateTime<Utc>,
) -> Result<EndpointSummary> {
    let month = history.in_window(endpoint.id, window_start(now, MONTH_WINDOW_HOURS)).await?;
    let day_start = window_start(now, DEFAULT_WINDOW_HOURS);
    let day: Vec<CheckResult> = month.iter().filter(|c| c.checked_at >= day_start).cloned().collect();

    // The newest check may be older than the month window
    let latest_check = match latest(&month) {
        Some(check) => Some(check.clone()),
        None => history.latest(endpoint.id).await?,
    };

    Ok(EndpointSummary {
        id: endpoint.id,
        hostname: endpoint.hostname.clone(),
        method: endpoint.method,
        interval: endpoint.interval_seconds,
        timeout: endpoint.timeout_seconds,
        is_active: endpoint.is_active,
        last_checked_at: endpoint.last_checked_at,
        is_down: is_currently_down(latest_check.as_ref()),
        uptime_24h: uptime_percentage(&day),
        uptime_30d: uptime_percentage(&month),
        avg_response_24h: average_response_time(&day),
        latest_check,
    })
}

/// Checks listed in a detail view
pub const DETAIL_CHECK_LIMIT: usize = 50;

/// Summary plus the most recent checks of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointDetail {
    #[serde(flatten)]
    pub summary: EndpointSummary,
    pub body: Option<String>,
    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Newest first, at most `DETAIL_CHECK_LIMIT`
    pub recent_checks: Vec<CheckResult>,
    pub checks_count: u64,
}

pub async fn detail(history: &dyn HistoryStore, endpoint: &Endpoint, now: DateTime<Utc>) -> Result<EndpointDetail> {
    let summary = summarize(history, endpoint, now).await?;
    let recent_checks = history.recent(endpoint.id, DETAIL_CHECK_LIMIT).await?;
    let checks_count = history.count(endpoint.id).await?;

    Ok(EndpointDetail {
        summary,
        body: endpoint.body.clone(),
        owner_id: endpoint.owner_id,
        created_at: endpoint.created_at,
        updated_at: endpoint.updated_at,
        recent_checks,
        checks_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::EndpointRepository;
    use crate::database::models::NewEndpoint;
    use crate::database::test_support::create_test_database;
    use crate::monitoring::types::CheckKind;

    fn success(ms: u64) -> CheckResult {
        CheckResult::from_response(1, 200, true, None, ms)
    }

    fn failure(kind: CheckKind) -> CheckResult {
        CheckResult::from_failure(1, kind, "down".into(), 10)
    }

    #[test]
    fn test_uptime_eight_of_ten() {
        let mut checks: Vec<CheckResult> = (0..8).map(|_| success(100)).collect();
        checks.push(failure(CheckKind::Fail));
        checks.push(failure(CheckKind::Fail));
        assert_eq!(uptime_percentage(&checks), Some(80.0));
    }

    #[test]
    fn test_uptime_rounds_to_two_decimals() {
        let checks = vec![success(1), success(1), failure(CheckKind::Timeout)];
        assert_eq!(uptime_percentage(&checks), Some(66.67));
    }

    #[test]
    fn test_uptime_without_data() {
        assert_eq!(uptime_percentage(&[]), None);
    }

    #[test]
    fn test_average_response_time() {
        assert_eq!(average_response_time(&[success(100), success(200)]), Some(150));
        assert_eq!(average_response_time(&[success(100), success(101)]), Some(101));
        assert_eq!(average_response_time(&[]), None);
    }

    #[test]
    fn test_average_skips_missing_response_times() {
        let mut no_time = failure(CheckKind::DnsError);
        no_time.response_time_ms = None;

        assert_eq!(average_response_time(&[success(100), success(200), no_time.clone()]), Some(150));
        assert_eq!(average_response_time(&[no_time]), None);
    }

    #[test]
    fn test_is_currently_down() {
        assert!(!is_currently_down(None));
        assert!(is_currently_down(Some(&failure(CheckKind::Fail))));
        assert!(!is_currently_down(Some(&success(10))));
    }

    #[tokio::test]
    async fn test_window_queries_against_history() -> Result<()> {
        let (db, _dir) = create_test_database().await?;
        let endpoint = db.create_endpoint(&NewEndpoint::new("example.com")).await?;
        let now = Utc::now();

        assert_eq!(uptime_in_window(&db, endpoint.id, now, DEFAULT_WINDOW_HOURS).await?, None);
        assert!(!endpoint_is_down(&db, endpoint.id).await?);

        // Old failures outside the 24h window
        for hours in [48, 47] {
            db.append(endpoint.id, &failure(CheckKind::Fail).at(now - Duration::hours(hours)))
                .await?;
        }
        for (minutes, ms) in [(30, 100), (20, 200)] {
            db.append(endpoint.id, &success(ms).at(now - Duration::minutes(minutes))).await?;
        }

        assert_eq!(uptime_in_window(&db, endpoint.id, now, DEFAULT_WINDOW_HOURS).await?, Some(100.0));
        assert_eq!(uptime_in_window(&db, endpoint.id, now, MONTH_WINDOW_HOURS).await?, Some(50.0));
        assert_eq!(avg_response_in_window(&db, endpoint.id, now, DEFAULT_WINDOW_HOURS).await?, Some(150));
        assert!(!endpoint_is_down(&db, endpoint.id).await?);

        db.append(endpoint.id, &failure(CheckKind::SslError).at(now - Duration::minutes(1))).await?;
        assert!(endpoint_is_down(&db, endpoint.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_summary() -> Result<()> {
        let (db, _dir) = create_test_database().await?;
        let endpoint = db.create_endpoint(&NewEndpoint::new("example.com")).await?;
        let now = Utc::now();

        let empty = summarize(&db, &endpoint, now).await?;
        assert!(!empty.is_down);
        assert_eq!(empty.uptime_24h, None);
        assert!(empty.latest_check.is_none());

        db.append(endpoint.id, &success(100).at(now - Duration::days(3))).await?;
        db.append(endpoint.id, &failure(CheckKind::Timeout).at(now - Duration::minutes(5))).await?;

        let summary = summarize(&db, &endpoint, now).await?;
        assert!(summary.is_down);
        assert_eq!(summary.uptime_24h, Some(0.0));
        assert_eq!(summary.uptime_30d, Some(50.0));
        assert_eq!(summary.avg_response_24h, Some(10));
        assert_eq!(summary.latest_check.map(|c| c.kind), Some(CheckKind::Timeout));
        Ok(())
    }

    #[tokio::test]
    async fn test_detail_caps_recent_checks() -> Result<()> {
        let (db, _dir) = create_test_database().await?;
        let endpoint = db.create_endpoint(&NewEndpoint::new("example.com").owned_by(4)).await?;
        let now = Utc::now();

        let empty = detail(&db, &endpoint, now).await?;
        assert!(empty.recent_checks.is_empty());
        assert_eq!(empty.checks_count, 0);

        for minutes in (1..=60).rev() {
            db.append(endpoint.id, &success(minutes as u64).at(now - Duration::minutes(minutes))).await?;
        }

        let view = detail(&db, &endpoint, now).await?;
        assert_eq!(view.checks_count, 60);
        assert_eq!(view.recent_checks.len(), DETAIL_CHECK_LIMIT);
        assert_eq!(view.recent_checks[0].response_time_ms, Some(1));
        assert_eq!(view.recent_checks[DETAIL_CHECK_LIMIT - 1].response_time_ms, Some(50));
        assert_eq!(view.owner_id, Some(4));
        assert_eq!(view.summary.uptime_24h, Some(100.0));

        let json = serde_json::to_value(&view)?;
        assert_eq!(json["hostname"], "example.com");
        assert_eq!(json["checks_count"], 60);
        Ok(())
    }
}
