use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info};

struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

/// Applied in order, each at most once. Append new versions at the end.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create domains table",
        statements: &[
            "CREATE TABLE IF NOT EXISTS domains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hostname TEXT NOT NULL,
                owner_id INTEGER,
                method TEXT NOT NULL DEFAULT 'GET' CHECK (method IN ('GET', 'HEAD')),
                interval_seconds INTEGER NOT NULL DEFAULT 60,
                timeout_seconds INTEGER NOT NULL DEFAULT 30,
                body TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_checked_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (hostname, owner_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_domains_is_active ON domains(is_active)",
            "CREATE INDEX IF NOT EXISTS idx_domains_owner_id ON domains(owner_id)",
        ],
    },
    Migration {
        version: 2,
        description: "Create domain_checks table",
        statements: &[
            "CREATE TABLE IF NOT EXISTS domain_checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain_id INTEGER NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
                result TEXT NOT NULL CHECK (result IN ('SUCCESS', 'FAIL', 'TIMEOUT', 'DNS_ERROR', 'SSL_ERROR')),
                response_code INTEGER,
                response_time_ms INTEGER,
                error_message TEXT,
                checked_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_domain_checks_domain_checked_at
                ON domain_checks(domain_id, checked_at DESC)",
        ],
    },
    Migration {
        version: 3,
        description: "Unique hostname per owner, ownerless included",
        statements: &[
            // UNIQUE (hostname, owner_id) treats every NULL owner as distinct
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_domains_hostname_owner
                ON domains(hostname, COALESCE(owner_id, -1))",
        ],
    },
];

fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Bring the schema up to the newest version
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let applied = applied_version(conn).await?;
    if applied >= latest_version() {
        debug!(version = applied, "Schema is current");
        return Ok(());
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        let tx = conn.transaction().await?;
        for statement in migration.statements {
            tx.execute(statement, ())
                .await
                .with_context(|| format!("migration v{} failed", migration.version))?;
        }
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
            libsql::params![migration.version, chrono::Utc::now().timestamp_millis(), migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(version = migration.version, "Applied migration: {}", migration.description);
    }

    Ok(())
}

async fn applied_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn.query("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", ()).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}
