//! The tabular store seam.
//!
//! Plans, the permission table and the plan template all live in a
//! sheet-like store: named sheets of 1-based rows and columns holding JSON
//! scalar cells. Share tokens live in a separate key/value property store.
//! Two adapters implement both traits: [`MemoryStore`] and [`PgStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OrgResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A single cell. `Value::Null` is a blank cell.
pub type CellValue = Value;

/// One row of cells, left to right.
pub type Row = Vec<CellValue>;

/// An inclusive rectangular block of cells, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub top: u32,
    pub left: u32,
    pub rows: u32,
    pub cols: u32,
}

impl Range {
    pub fn new(top: u32, left: u32, rows: u32, cols: u32) -> Self {
        Self {
            top,
            left,
            rows,
            cols,
        }
    }

    /// Rows `top..=bottom` across `cols` columns starting at column 1.
    /// Empty when `bottom < top`.
    pub fn rows_between(top: u32, bottom: u32, cols: u32) -> Self {
        Self::new(top, 1, (bottom + 1).saturating_sub(top), cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.rows.saturating_sub(1)
    }

    pub fn right(&self) -> u32 {
        self.left + self.cols.saturating_sub(1)
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        !self.is_empty()
            && (self.top..=self.bottom()).contains(&row)
            && (self.left..=self.right()).contains(&col)
    }
}

/// Sheet-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    pub hidden: bool,
    pub protected: bool,
}

/// Sheet-like persistent store.
///
/// Every failure is reported as [`crate::OrgError::StoreAccess`] except the
/// lookups that can legitimately miss, which return `Option`/`bool`.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// All sheets in creation order.
    async fn list_sheets(&self) -> OrgResult<Vec<SheetInfo>>;

    async fn sheet(&self, name: &str) -> OrgResult<Option<SheetInfo>>;

    /// Create an empty sheet. Fails if the name is taken.
    async fn create_sheet(&self, name: &str, hidden: bool) -> OrgResult<SheetInfo>;

    /// Copy `from` (cells included) to a new visible, unprotected sheet `to`.
    async fn copy_sheet(&self, from: &str, to: &str) -> OrgResult<SheetInfo>;

    /// Rename a sheet, keeping its cells and flags. Fails if `from` is
    /// missing or `to` is taken.
    async fn rename_sheet(&self, from: &str, to: &str) -> OrgResult<()>;

    /// Returns `false` when the sheet did not exist.
    async fn delete_sheet(&self, name: &str) -> OrgResult<bool>;

    /// Advisory protection: recorded, not enforced.
    async fn protect_sheet(&self, name: &str, note: &str) -> OrgResult<()>;

    /// Read exactly `range.rows` rows of `range.cols` cells; blanks are null.
    async fn read_range(&self, name: &str, range: Range) -> OrgResult<Vec<Row>>;

    /// Write `rows` with the top-left cell at (`top`, `left`).
    async fn write_range(&self, name: &str, top: u32, left: u32, rows: &[Row]) -> OrgResult<()>;

    async fn clear_range(&self, name: &str, range: Range) -> OrgResult<()>;

    /// Write `row` below the last non-blank row. Returns its row number.
    async fn append_row(&self, name: &str, row: Row) -> OrgResult<u32>;

    /// Remove a row, shifting every row below it up by one.
    async fn delete_row(&self, name: &str, row: u32) -> OrgResult<()>;

    /// Last row holding any value; 0 for an empty sheet.
    async fn last_row(&self, name: &str) -> OrgResult<u32>;
}

/// Namespaced string key/value store.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn get(&self, key: &str) -> OrgResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> OrgResult<()>;

    /// Returns `false` when the key did not exist.
    async fn delete(&self, key: &str) -> OrgResult<bool>;
}

/// Render a cell as text. Strings come back verbatim, numbers keep their
/// shortest form (`3.0` renders as `3`) and booleans render as
/// `true`/`false`.
pub fn cell_text(value: &CellValue) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// A blank cell is null or whitespace-only text.
pub fn is_blank(value: &CellValue) -> bool {
    cell_text(value).trim().is_empty()
}

// Compile-time assertion: both traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TabularStore, _: &dyn PropertyStore) {}
};
