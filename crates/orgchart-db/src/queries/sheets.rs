//! Database query functions for the `sheets` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Sheet;

/// Insert a new, empty sheet. Fails if a sheet with that name exists.
pub async fn insert_sheet(pool: &PgPool, name: &str, hidden: bool) -> Result<Sheet> {
    let sheet = sqlx::query_as::<_, Sheet>(
        "INSERT INTO sheets (name, hidden) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(hidden)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert sheet {name:?}"))?;

    Ok(sheet)
}

/// Fetch a sheet by name.
pub async fn get_sheet(pool: &PgPool, name: &str) -> Result<Option<Sheet>> {
    let sheet = sqlx::query_as::<_, Sheet>("SELECT * FROM sheets WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("failed to fetch sheet")?;

    Ok(sheet)
}

/// List all sheets in creation order.
pub async fn list_sheets(pool: &PgPool) -> Result<Vec<Sheet>> {
    let sheets = sqlx::query_as::<_, Sheet>("SELECT * FROM sheets ORDER BY position")
        .fetch_all(pool)
        .await
        .context("failed to list sheets")?;

    Ok(sheets)
}

/// Rename a sheet. Cells follow via `ON UPDATE CASCADE`.
pub async fn rename_sheet(pool: &PgPool, from: &str, to: &str) -> Result<()> {
    let result = sqlx::query("UPDATE sheets SET name = $1 WHERE name = $2")
        .bind(to)
        .bind(from)
        .execute(pool)
        .await
        .with_context(|| format!("failed to rename sheet {from:?} to {to:?}"))?;

    if result.rows_affected() == 0 {
        anyhow::bail!("sheet {from:?} not found");
    }

    Ok(())
}

/// Delete a sheet and all its cells. Returns `false` if it did not exist.
pub async fn delete_sheet(pool: &PgPool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sheets WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete sheet {name:?}"))?;

    Ok(result.rows_affected() > 0)
}

/// Mark a sheet protected with an advisory note.
pub async fn set_protected(pool: &PgPool, name: &str, note: &str) -> Result<()> {
    let result =
        sqlx::query("UPDATE sheets SET protected = TRUE, protection_note = $1 WHERE name = $2")
            .bind(note)
            .bind(name)
            .execute(pool)
            .await
            .context("failed to protect sheet")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("sheet {name:?} not found");
    }

    Ok(())
}

/// Copy a sheet and all its cells under a new name.
///
/// The copy is visible and unprotected regardless of the source flags.
/// Runs in a single transaction.
pub async fn copy_sheet(pool: &PgPool, from: &str, to: &str) -> Result<Sheet> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sheets WHERE name = $1)")
        .bind(from)
        .fetch_one(&mut *tx)
        .await
        .context("failed to look up source sheet")?;
    if !exists {
        anyhow::bail!("sheet {from:?} not found");
    }

    let sheet = sqlx::query_as::<_, Sheet>(
        "INSERT INTO sheets (name, hidden) VALUES ($1, FALSE) RETURNING *",
    )
    .bind(to)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("failed to insert sheet {to:?}"))?;

    sqlx::query(
        "INSERT INTO cells (sheet, row_idx, col_idx, value) \
         SELECT $1, row_idx, col_idx, value FROM cells WHERE sheet = $2",
    )
    .bind(to)
    .bind(from)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to copy cells from {from:?} to {to:?}"))?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(sheet)
}
