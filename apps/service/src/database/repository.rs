use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};

use super::models::{Endpoint, HttpMethod, NewEndpoint, from_millis, to_millis};
use crate::monitoring::scheduler::select_due;
use crate::monitoring::types::{CheckKind, CheckResult};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Registry of monitored endpoints
#[async_trait]
pub trait EndpointRepository: Send + Sync {
    /// All endpoints, active or not, ordered by id
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Endpoints with `is_active` set, ordered by id
    async fn active_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Active endpoints whose interval has elapsed at `now`
    async fn due_endpoints(&self, now: DateTime<Utc>) -> Result<Vec<Endpoint>> {
        let active = self.active_endpoints().await?;
        Ok(select_due(now, &active))
    }

    async fn get_endpoint(&self, id: i64) -> Result<Option<Endpoint>>;

    async fn find_endpoint(&self, hostname: &str, owner_id: Option<i64>) -> Result<Option<Endpoint>>;

    async fn create_endpoint(&self, endpoint: &NewEndpoint) -> Result<Endpoint>;

    /// Store the editable fields of `endpoint` (hostname, method, interval,
    /// timeout, body). `None` when no endpoint has its id.
    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<Option<Endpoint>>;

    /// Returns false when no endpoint has this id
    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool>;

    /// Deletes the endpoint together with its check history
    async fn delete_endpoint(&self, id: i64) -> Result<bool>;

    /// Record that a probe for `id` completed at `now`
    async fn mark_checked(&self, id: i64, now: DateTime<Utc>) -> Result<()>;
}

/// Append-only ledger of probe outcomes
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist `result` for `endpoint_id` and return it with its row id
    async fn append(&self, endpoint_id: i64, result: &CheckResult) -> Result<CheckResult>;

    /// Most recent result by `checked_at`
    async fn latest(&self, endpoint_id: i64) -> Result<Option<CheckResult>>;

    /// Results with `checked_at >= since`, oldest first
    async fn in_window(&self, endpoint_id: i64, since: DateTime<Utc>) -> Result<Vec<CheckResult>>;

    /// Up to `limit` results, newest first
    async fn recent(&self, endpoint_id: i64, limit: usize) -> Result<Vec<CheckResult>>;

    async fn count(&self, endpoint_id: i64) -> Result<u64>;
}

const ENDPOINT_COLUMNS: &str = "id, hostname, method, interval_seconds, timeout_seconds, body, is_active, last_checked_at, owner_id, created_at, updated_at";
const CHECK_COLUMNS: &str = "id, domain_id, result, response_code, response_time_ms, error_message, checked_at";

/// LibSQL implementation of both stores
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("Failed to get database connection: {e}"))
    }

    async fn query_endpoints(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Endpoint>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut endpoints = Vec::new();

        while let Some(row) = rows.next().await? {
            endpoints.push(endpoint_from_row(&row)?);
        }

        Ok(endpoints)
    }

    async fn query_checks(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut checks = Vec::new();

        while let Some(row) = rows.next().await? {
            checks.push(check_from_row(&row)?);
        }

        Ok(checks)
    }
}

fn endpoint_from_row(row: &Row) -> Result<Endpoint> {
    let method: String = row.get(2)?;

    Ok(Endpoint {
        id: row.get(0)?,
        hostname: row.get(1)?,
        method: method.parse::<HttpMethod>()?,
        interval_seconds: row.get::<i64>(3)? as u64,
        timeout_seconds: row.get::<i64>(4)? as u64,
        body: row.get(5)?,
        is_active: row.get::<i64>(6)? != 0,
        last_checked_at: row.get::<Option<i64>>(7)?.map(from_millis),
        owner_id: row.get(8)?,
        created_at: from_millis(row.get(9)?),
        updated_at: from_millis(row.get(10)?),
    })
}

fn check_from_row(row: &Row) -> Result<CheckResult> {
    let kind: String = row.get(2)?;

    Ok(CheckResult {
        id: Some(row.get(0)?),
        endpoint_id: row.get(1)?,
        kind: kind.parse::<CheckKind>()?,
        response_code: row.get::<Option<i64>>(3)?.map(|v| v as u16),
        response_time_ms: row.get::<Option<i64>>(4)?.map(|v| v as u64),
        error_message: row.get(5)?,
        checked_at: from_millis(row.get(6)?),
    })
}

#[async_trait]
impl EndpointRepository for DatabaseImpl {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.query_endpoints(&format!("SELECT {ENDPOINT_COLUMNS} FROM domains ORDER BY id"), ())
            .await
    }

    async fn active_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.query_endpoints(
            &format!("SELECT {ENDPOINT_COLUMNS} FROM domains WHERE is_active = 1 ORDER BY id"),
            (),
        )
        .await
    }

    async fn get_endpoint(&self, id: i64) -> Result<Option<Endpoint>> {
        let endpoints = self
            .query_endpoints(&format!("SELECT {ENDPOINT_COLUMNS} FROM domains WHERE id = ?"), params![id])
            .await?;
        Ok(endpoints.into_iter().next())
    }

    async fn find_endpoint(&self, hostname: &str, owner_id: Option<i64>) -> Result<Option<Endpoint>> {
        let endpoints = self
            .query_endpoints(
                &format!("SELECT {ENDPOINT_COLUMNS} FROM domains WHERE hostname = ? AND owner_id IS ?"),
                params![hostname, owner_id],
            )
            .await?;
        Ok(endpoints.into_iter().next())
    }

    async fn create_endpoint(&self, endpoint: &NewEndpoint) -> Result<Endpoint> {
        let conn = self.get_conn().await?;
        let now = to_millis(Utc::now());

        conn.execute(
            "INSERT INTO domains (hostname, owner_id, method, interval_seconds, timeout_seconds, body, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                endpoint.hostname.clone(),
                endpoint.owner_id,
                endpoint.method.as_str(),
                endpoint.interval_seconds as i64,
                endpoint.timeout_seconds as i64,
                endpoint.body.clone(),
                if endpoint.is_active { 1 } else { 0 },
                now,
                now
            ],
        )
        .await
        .with_context(|| format!("Failed to insert domain {}", endpoint.hostname))?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_endpoint(id)
            .await?
            .ok_or_else(|| anyhow!("Domain {id} vanished right after insert"))
    }

    async fn update_endpoint(&self, endpoint: &Endpoint) -> Result<Option<Endpoint>> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE domains SET hostname = ?, method = ?, interval_seconds = ?, timeout_seconds = ?, body = ?, updated_at = ? WHERE id = ?",
                params![
                    endpoint.hostname.clone(),
                    endpoint.method.as_str(),
                    endpoint.interval_seconds as i64,
                    endpoint.timeout_seconds as i64,
                    endpoint.body.clone(),
                    to_millis(Utc::now()),
                    endpoint.id
                ],
            )
            .await
            .with_context(|| format!("Failed to update domain {}", endpoint.id))?;
        drop(conn);

        if changed == 0 {
            return Ok(None);
        }
        self.get_endpoint(endpoint.id).await
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE domains SET is_active = ?, updated_at = ? WHERE id = ?",
                params![if is_active { 1 } else { 0 }, to_millis(Utc::now()), id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn delete_endpoint(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;

        // domain_checks rows are removed via ON DELETE CASCADE
        let deleted = conn.execute("DELETE FROM domains WHERE id = ?", params![id]).await?;
        Ok(deleted > 0)
    }

    async fn mark_checked(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE domains SET last_checked_at = ? WHERE id = ?",
            params![to_millis(now), id],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for DatabaseImpl {
    async fn append(&self, endpoint_id: i64, result: &CheckResult) -> Result<CheckResult> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO domain_checks (domain_id, result, response_code, response_time_ms, error_message, checked_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                endpoint_id,
                result.kind.as_str(),
                result.response_code.map(|v| v as i64),
                result.response_time_ms.map(|v| v as i64),
                result.error_message.clone(),
                to_millis(result.checked_at)
            ],
        )
        .await?;

        Ok(CheckResult {
            id: Some(conn.last_insert_rowid()),
            endpoint_id,
            ..result.clone()
        })
    }

    async fn latest(&self, endpoint_id: i64) -> Result<Option<CheckResult>> {
        let checks = self
            .query_checks(
                &format!("SELECT {CHECK_COLUMNS} FROM domain_checks WHERE domain_id = ? ORDER BY checked_at DESC, id DESC LIMIT 1"),
                params![endpoint_id],
            )
            .await?;
        Ok(checks.into_iter().next())
    }

    async fn in_window(&self, endpoint_id: i64, since: DateTime<Utc>) -> Result<Vec<CheckResult>> {
        self.query_checks(
            &format!("SELECT {CHECK_COLUMNS} FROM domain_checks WHERE domain_id = ? AND checked_at >= ? ORDER BY checked_at ASC, id ASC"),
            params![endpoint_id, to_millis(since)],
        )
        .await
    }

    async fn recent(&self, endpoint_id: i64, limit: usize) -> Result<Vec<CheckResult>> {
        self.query_checks(
            &format!("SELECT {CHECK_COLUMNS} FROM domain_checks WHERE domain_id = ? ORDER BY checked_at DESC, id DESC LIMIT ?"),
            params![endpoint_id, limit as i64],
        )
        .await
    }

    async fn count(&self, endpoint_id: i64) -> Result<u64> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM domain_checks WHERE domain_id = ?", params![endpoint_id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }
}
