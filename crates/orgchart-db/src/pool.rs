use anyhow::{Context, Result};
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;
use crate::models::StoreSummary;

/// Tabular store schema, embedded from `crates/orgchart-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    config
        .pool_options()
        .connect_with(config.connect_options()?)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.redacted()))
}

/// Bring the tabular store schema up to date.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to migrate the tabular store schema")?;
    info!(migrations = MIGRATOR.iter().count(), "tabular store schema up to date");
    Ok(())
}

/// Quote `name` as a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create the target database through the `postgres` maintenance database
/// when it does not exist yet.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = config.database_name()?;
    let maint_pool = config
        .pool_options()
        .max_connections(1)
        .connect_with(config.maintenance_options()?)
        .await
        .with_context(|| {
            format!("failed to connect to the maintenance database of {}", config.redacted())
        })?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&maint_pool)
            .await
            .context("failed to query pg_database")?;

    if exists {
        info!(db = %db_name, "database already exists");
    } else {
        let stmt = format!("CREATE DATABASE {}", quote_ident(&db_name));
        maint_pool
            .execute(stmt.as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = %db_name, "database created");
    }

    maint_pool.close().await;
    Ok(())
}

/// What the tabular store currently holds, for the `db-init` summary.
pub async fn store_summary(pool: &PgPool) -> Result<StoreSummary> {
    sqlx::query_as(
        "SELECT \
           (SELECT COUNT(*) FROM sheets WHERE NOT hidden) AS visible_sheets, \
           (SELECT COUNT(*) FROM sheets WHERE hidden) AS hidden_sheets, \
           (SELECT COUNT(*) FROM cells) AS cells, \
           (SELECT COUNT(*) FROM properties) AS properties, \
           (SELECT COUNT(*) FROM storage_grants) AS grants",
    )
    .fetch_one(pool)
    .await
    .context("failed to summarize the tabular store")
}
