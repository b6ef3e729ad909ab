//! Database query functions for the `cells` table.
//!
//! Ranges are inclusive and 1-based. Blank cells are never stored: writing a
//! JSON `null` clears the cell.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Cell;

/// An inclusive rectangular cell range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

/// Read every stored cell inside `range`, ordered by row then column.
pub async fn read_cells(pool: &PgPool, sheet: &str, range: CellRange) -> Result<Vec<Cell>> {
    let cells = sqlx::query_as::<_, Cell>(
        "SELECT row_idx, col_idx, value FROM cells \
         WHERE sheet = $1 AND row_idx BETWEEN $2 AND $3 AND col_idx BETWEEN $4 AND $5 \
         ORDER BY row_idx, col_idx",
    )
    .bind(sheet)
    .bind(range.top)
    .bind(range.bottom)
    .bind(range.left)
    .bind(range.right)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to read cells from sheet {sheet:?}"))?;

    Ok(cells)
}

/// Replace the contents of `range` with `cells`.
///
/// Every cell inside the range is cleared first, then the non-null values
/// are inserted, in one transaction.
pub async fn replace_cells(
    pool: &PgPool,
    sheet: &str,
    range: CellRange,
    cells: &[Cell],
) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    sqlx::query(
        "DELETE FROM cells \
         WHERE sheet = $1 AND row_idx BETWEEN $2 AND $3 AND col_idx BETWEEN $4 AND $5",
    )
    .bind(sheet)
    .bind(range.top)
    .bind(range.bottom)
    .bind(range.left)
    .bind(range.right)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to clear cells in sheet {sheet:?}"))?;

    let mut rows = Vec::with_capacity(cells.len());
    let mut cols = Vec::with_capacity(cells.len());
    let mut values = Vec::with_capacity(cells.len());
    for cell in cells.iter().filter(|c| !c.value.is_null()) {
        rows.push(cell.row_idx);
        cols.push(cell.col_idx);
        values.push(cell.value.clone());
    }

    if !rows.is_empty() {
        sqlx::query(
            "INSERT INTO cells (sheet, row_idx, col_idx, value) \
             SELECT $1, r, c, v FROM UNNEST($2::int4[], $3::int4[], $4::jsonb[]) AS t(r, c, v)",
        )
        .bind(sheet)
        .bind(&rows)
        .bind(&cols)
        .bind(&values)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to write cells to sheet {sheet:?}"))?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(())
}

/// Delete every cell inside `range`. Returns the number of cells removed.
pub async fn clear_cells(pool: &PgPool, sheet: &str, range: CellRange) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM cells \
         WHERE sheet = $1 AND row_idx BETWEEN $2 AND $3 AND col_idx BETWEEN $4 AND $5",
    )
    .bind(sheet)
    .bind(range.top)
    .bind(range.bottom)
    .bind(range.left)
    .bind(range.right)
    .execute(pool)
    .await
    .with_context(|| format!("failed to clear cells in sheet {sheet:?}"))?;

    Ok(result.rows_affected())
}

/// The highest row holding any value, or 0 for an empty sheet.
pub async fn last_row(pool: &PgPool, sheet: &str) -> Result<i32> {
    let row: Option<i32> = sqlx::query_scalar("SELECT MAX(row_idx) FROM cells WHERE sheet = $1")
        .bind(sheet)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to find last row of sheet {sheet:?}"))?;

    Ok(row.unwrap_or(0))
}

/// Delete a whole row and shift every row below it up by one.
///
/// The shift goes through negative indices so the primary key never sees
/// two cells at the same position mid-statement.
pub async fn delete_row(pool: &PgPool, sheet: &str, row: i32) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    sqlx::query("DELETE FROM cells WHERE sheet = $1 AND row_idx = $2")
        .bind(sheet)
        .bind(row)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to delete row {row} of sheet {sheet:?}"))?;

    sqlx::query("UPDATE cells SET row_idx = -(row_idx - 1) WHERE sheet = $1 AND row_idx > $2")
        .bind(sheet)
        .bind(row)
        .execute(&mut *tx)
        .await
        .context("failed to shift rows")?;

    sqlx::query("UPDATE cells SET row_idx = -row_idx WHERE sheet = $1 AND row_idx < 0")
        .bind(sheet)
        .execute(&mut *tx)
        .await
        .context("failed to shift rows")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(())
}
