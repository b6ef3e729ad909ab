//! Database query functions for the `storage_grants` access mirror.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::StorageGrant;

/// Grant (or change) storage-level access for an email.
pub async fn upsert_grant(pool: &PgPool, email: &str, level: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO storage_grants (email, level) VALUES ($1, $2) \
         ON CONFLICT (email) DO UPDATE SET level = EXCLUDED.level, granted_at = now()",
    )
    .bind(email)
    .bind(level)
    .execute(pool)
    .await
    .with_context(|| format!("failed to grant storage access to {email}"))?;

    Ok(())
}

/// Revoke storage-level access. Returns `false` if none was granted.
pub async fn delete_grant(pool: &PgPool, email: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM storage_grants WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await
        .with_context(|| format!("failed to revoke storage access from {email}"))?;

    Ok(result.rows_affected() > 0)
}

/// List every grant, ordered by email.
pub async fn list_grants(pool: &PgPool) -> Result<Vec<StorageGrant>> {
    let grants = sqlx::query_as::<_, StorageGrant>("SELECT * FROM storage_grants ORDER BY email")
        .fetch_all(pool)
        .await
        .context("failed to list storage grants")?;

    Ok(grants)
}
