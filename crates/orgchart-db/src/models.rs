use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named sheet in the tabular store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sheet {
    pub name: String,
    /// Creation order; sheets list in this order.
    pub position: i64,
    pub hidden: bool,
    pub protected: bool,
    pub protection_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One non-blank cell. Rows and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Cell {
    pub row_idx: i32,
    pub col_idx: i32,
    pub value: serde_json::Value,
}

/// A storage-level access grant mirrored from the permission table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageGrant {
    pub email: String,
    pub level: String,
    pub granted_at: DateTime<Utc>,
}

/// Row counts across the tabular store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoreSummary {
    /// Plan sheets.
    pub visible_sheets: i64,
    /// Template and permission sheets.
    pub hidden_sheets: i64,
    pub cells: i64,
    pub properties: i64,
    pub grants: i64,
}
