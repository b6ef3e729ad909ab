//! Postgres-backed store over the `orgchart-db` query modules.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use orgchart_db::models::{Cell, Sheet};
use orgchart_db::queries::cells::{self, CellRange};
use orgchart_db::queries::{grants, properties, sheets};

use super::{PropertyStore, Range, Row, SheetInfo, TabularStore};
use crate::error::OrgResult;
use crate::permission::Permission;
use crate::permission::access::AccessMirror;

/// A [`TabularStore`], [`PropertyStore`] and [`AccessMirror`] in Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<Sheet> for SheetInfo {
    fn from(s: Sheet) -> Self {
        Self {
            name: s.name,
            hidden: s.hidden,
            protected: s.protected,
        }
    }
}

fn cell_range(range: Range) -> CellRange {
    CellRange {
        top: range.top as i32,
        left: range.left as i32,
        bottom: range.bottom() as i32,
        right: range.right() as i32,
    }
}

#[async_trait]
impl TabularStore for PgStore {
    async fn list_sheets(&self) -> OrgResult<Vec<SheetInfo>> {
        let all = sheets::list_sheets(&self.pool).await?;
        Ok(all.into_iter().map(SheetInfo::from).collect())
    }

    async fn sheet(&self, name: &str) -> OrgResult<Option<SheetInfo>> {
        Ok(sheets::get_sheet(&self.pool, name).await?.map(SheetInfo::from))
    }

    async fn create_sheet(&self, name: &str, hidden: bool) -> OrgResult<SheetInfo> {
        Ok(sheets::insert_sheet(&self.pool, name, hidden).await?.into())
    }

    async fn copy_sheet(&self, from: &str, to: &str) -> OrgResult<SheetInfo> {
        Ok(sheets::copy_sheet(&self.pool, from, to).await?.into())
    }

    async fn rename_sheet(&self, from: &str, to: &str) -> OrgResult<()> {
        Ok(sheets::rename_sheet(&self.pool, from, to).await?)
    }

    async fn delete_sheet(&self, name: &str) -> OrgResult<bool> {
        Ok(sheets::delete_sheet(&self.pool, name).await?)
    }

    async fn protect_sheet(&self, name: &str, note: &str) -> OrgResult<()> {
        Ok(sheets::set_protected(&self.pool, name, note).await?)
    }

    async fn read_range(&self, name: &str, range: Range) -> OrgResult<Vec<Row>> {
        let mut rows = vec![vec![Value::Null; range.cols as usize]; range.rows as usize];
        if range.is_empty() {
            return Ok(rows);
        }
        for cell in cells::read_cells(&self.pool, name, cell_range(range)).await? {
            let r = (cell.row_idx as u32 - range.top) as usize;
            let c = (cell.col_idx as u32 - range.left) as usize;
            rows[r][c] = cell.value;
        }
        Ok(rows)
    }

    async fn write_range(&self, name: &str, top: u32, left: u32, rows: &[Row]) -> OrgResult<()> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0) as u32;
        let range = Range::new(top, left, rows.len() as u32, width);
        if range.is_empty() {
            return Ok(());
        }
        let cells: Vec<Cell> = rows
            .iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.iter().enumerate().map(move |(c, value)| Cell {
                    row_idx: (top + r as u32) as i32,
                    col_idx: (left + c as u32) as i32,
                    value: value.clone(),
                })
            })
            .collect();
        cells::replace_cells(&self.pool, name, cell_range(range), &cells).await?;
        Ok(())
    }

    async fn clear_range(&self, name: &str, range: Range) -> OrgResult<()> {
        if !range.is_empty() {
            cells::clear_cells(&self.pool, name, cell_range(range)).await?;
        }
        Ok(())
    }

    async fn append_row(&self, name: &str, row: Row) -> OrgResult<u32> {
        // Not atomic with concurrent appends; the permission table is
        // written by one request at a time.
        let target = cells::last_row(&self.pool, name).await? as u32 + 1;
        self.write_range(name, target, 1, &[row]).await?;
        Ok(target)
    }

    async fn delete_row(&self, name: &str, row: u32) -> OrgResult<()> {
        Ok(cells::delete_row(&self.pool, name, row as i32).await?)
    }

    async fn last_row(&self, name: &str) -> OrgResult<u32> {
        Ok(cells::last_row(&self.pool, name).await? as u32)
    }
}

#[async_trait]
impl PropertyStore for PgStore {
    async fn get(&self, key: &str) -> OrgResult<Option<String>> {
        Ok(properties::get_property(&self.pool, key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> OrgResult<()> {
        Ok(properties::set_property(&self.pool, key, value).await?)
    }

    async fn delete(&self, key: &str) -> OrgResult<bool> {
        Ok(properties::delete_property(&self.pool, key).await?)
    }
}

#[async_trait]
impl AccessMirror for PgStore {
    async fn grant(&self, email: &str, permission: Permission) -> anyhow::Result<()> {
        grants::upsert_grant(&self.pool, email, &permission.to_string()).await
    }

    async fn revoke(&self, email: &str) -> anyhow::Result<()> {
        grants::delete_grant(&self.pool, email).await?;
        Ok(())
    }
}
