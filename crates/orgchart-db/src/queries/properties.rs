//! Database query functions for the `properties` key/value table.

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Fetch a property value by key.
pub async fn get_property(pool: &PgPool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM properties WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("failed to fetch property")?;

    Ok(value)
}

/// Insert or overwrite a property.
pub async fn set_property(pool: &PgPool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO properties (key, value) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("failed to set property")?;

    Ok(())
}

/// Delete a property. Returns `false` if it did not exist.
pub async fn delete_property(pool: &PgPool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM properties WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await
        .context("failed to delete property")?;

    Ok(result.rows_affected() > 0)
}
