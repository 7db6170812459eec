/// Database abstraction layer
///
/// Endpoints and their check history live in a local LibSQL database. The
/// rest of the service only talks to the `EndpointRepository` and
/// `HistoryStore` traits.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{DatabaseImpl, EndpointRepository, HistoryStore};

use anyhow::Result;

use crate::pool::LibsqlPool;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Run migrations on a pooled connection and wrap the pool
pub async fn open_database(pool: LibsqlPool) -> Result<DatabaseImpl> {
    let conn = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get database connection: {e}"))?;
    initialize_database(&conn).await?;
    drop(conn);

    Ok(DatabaseImpl::new_from_pool(pool))
}

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::Result;
    use tempfile::{TempDir, tempdir};

    use super::{DatabaseImpl, open_database};
    use crate::pool::open_pool;

    /// Fresh migrated database in a temporary directory.
    ///
    /// Keep the returned `TempDir` alive for as long as the database is used.
    pub async fn create_test_database() -> Result<(DatabaseImpl, TempDir)> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        let pool = open_pool(&db_path, 8).await?;
        let database = open_database(pool).await?;

        Ok((database, temp_dir))
    }
}
