/// Host registry storage
///
/// LibSQL (SQLite) behind a deadpool connection pool. The monitor only sees
/// it through [`crate::monitoring::HostStore`]; the HTTP surface uses
/// [`HostRepository`].
pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{HostDetails, HostRecord, HostType, NewHost};
pub use repository::{DatabaseImpl, HostRepository, StoreError};

use anyhow::{Context, Result};

use crate::config::DatabaseSettings;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the pool for the configured database file
pub async fn open_pool(settings: &DatabaseSettings) -> Result<LibsqlPool> {
    let database = libsql::Builder::new_local(&settings.path)
        .build()
        .await
        .with_context(|| format!("failed to open database {}", settings.path))?;

    let pool = deadpool::managed::Pool::builder(LibsqlManager::new(database))
        .max_size(settings.pool_size)
        .build()?;

    Ok(pool)
}

/// Open the pool, bring the schema up to date and wrap it in a store
pub async fn open_database(settings: &DatabaseSettings) -> Result<DatabaseImpl> {
    let pool = open_pool(settings).await?;

    {
        let conn = pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("failed to get database connection: {e}"))?;
        tracing::info!("Initializing database schema...");
        initialize_database(&conn).await?;
    }

    Ok(DatabaseImpl::new_from_pool(pool))
}
