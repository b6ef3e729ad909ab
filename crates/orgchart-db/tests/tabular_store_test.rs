//! Integration tests for the sheet, cell, property and grant queries.
//!
//! Each test creates an isolated temporary database through
//! `orgchart-test-utils` and drops it on completion.

use serde_json::json;

use orgchart_db::models::{Cell, StoreSummary};
use orgchart_db::pool;
use orgchart_db::queries::cells::{self, CellRange};
use orgchart_db::queries::{grants, properties, sheets};
use orgchart_test_utils::ScratchDb;

fn cell(row_idx: i32, col_idx: i32, value: serde_json::Value) -> Cell {
    Cell {
        row_idx,
        col_idx,
        value,
    }
}

const WHOLE: CellRange = CellRange {
    top: 1,
    left: 1,
    bottom: 1000,
    right: 26,
};

#[tokio::test]
async fn insert_list_and_delete_sheets() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();

    sheets::insert_sheet(&pool, "current", false).await.unwrap();
    sheets::insert_sheet(&pool, "_template", true).await.unwrap();

    let all = sheets::list_sheets(&pool).await.unwrap();
    let names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["current", "_template"]);
    assert!(all[1].hidden);

    // Duplicate names are rejected by the primary key.
    assert!(sheets::insert_sheet(&pool, "current", false).await.is_err());

    assert!(sheets::delete_sheet(&pool, "current").await.unwrap());
    assert!(!sheets::delete_sheet(&pool, "current").await.unwrap());
    assert!(sheets::get_sheet(&pool, "current").await.unwrap().is_none());

    db.destroy().await;
}

#[tokio::test]
async fn copy_sheet_copies_cells_and_clears_flags() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();

    sheets::insert_sheet(&pool, "_template", true).await.unwrap();
    sheets::set_protected(&pool, "_template", "do not edit")
        .await
        .unwrap();
    cells::replace_cells(
        &pool,
        "_template",
        WHOLE,
        &[cell(1, 1, json!("name")), cell(5, 1, json!("id"))],
    )
    .await
    .unwrap();

    let copy = sheets::copy_sheet(&pool, "_template", "q1").await.unwrap();
    assert!(!copy.hidden);
    assert!(!copy.protected);

    let copied = cells::read_cells(&pool, "q1", WHOLE).await.unwrap();
    assert_eq!(copied.len(), 2);
    assert_eq!(copied[1], cell(5, 1, json!("id")));

    // Missing source fails without creating the target.
    assert!(sheets::copy_sheet(&pool, "nope", "q2").await.is_err());
    assert!(sheets::get_sheet(&pool, "q2").await.unwrap().is_none());

    db.destroy().await;
}

#[tokio::test]
async fn rename_sheet_carries_cells() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();

    sheets::insert_sheet(&pool, "draft", false).await.unwrap();
    cells::replace_cells(&pool, "draft", WHOLE, &[cell(6, 1, json!("n1"))])
        .await
        .unwrap();

    sheets::rename_sheet(&pool, "draft", "final").await.unwrap();
    assert!(sheets::get_sheet(&pool, "draft").await.unwrap().is_none());
    let moved = cells::read_cells(&pool, "final", WHOLE).await.unwrap();
    assert_eq!(moved, vec![cell(6, 1, json!("n1"))]);

    assert!(sheets::rename_sheet(&pool, "draft", "other").await.is_err());

    db.destroy().await;
}

#[tokio::test]
async fn replace_cells_skips_nulls_and_clears_range() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();
    sheets::insert_sheet(&pool, "p", false).await.unwrap();

    cells::replace_cells(
        &pool,
        "p",
        WHOLE,
        &[cell(6, 1, json!("n1")), cell(7, 1, json!("n2"))],
    )
    .await
    .unwrap();
    assert_eq!(cells::last_row(&pool, "p").await.unwrap(), 7);

    let range = CellRange {
        top: 6,
        left: 1,
        bottom: 6,
        right: 12,
    };
    cells::replace_cells(
        &pool,
        "p",
        range,
        &[cell(6, 1, json!("n9")), cell(6, 2, serde_json::Value::Null)],
    )
    .await
    .unwrap();

    let stored = cells::read_cells(&pool, "p", WHOLE).await.unwrap();
    assert_eq!(
        stored,
        vec![cell(6, 1, json!("n9")), cell(7, 1, json!("n2"))]
    );

    let removed = cells::clear_cells(&pool, "p", WHOLE).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(cells::last_row(&pool, "p").await.unwrap(), 0);

    db.destroy().await;
}

#[tokio::test]
async fn delete_row_shifts_following_rows_up() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();
    sheets::insert_sheet(&pool, "_permissions", true)
        .await
        .unwrap();

    let rows: Vec<Cell> = ["a@x.io", "b@x.io", "c@x.io", "d@x.io"]
        .iter()
        .enumerate()
        .map(|(i, email)| cell(i as i32 + 2, 1, json!(email)))
        .collect();
    cells::replace_cells(&pool, "_permissions", WHOLE, &rows)
        .await
        .unwrap();

    cells::delete_row(&pool, "_permissions", 3).await.unwrap();

    let stored = cells::read_cells(&pool, "_permissions", WHOLE)
        .await
        .unwrap();
    assert_eq!(
        stored,
        vec![
            cell(2, 1, json!("a@x.io")),
            cell(3, 1, json!("c@x.io")),
            cell(4, 1, json!("d@x.io")),
        ]
    );

    db.destroy().await;
}

#[tokio::test]
async fn properties_set_get_delete() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();

    assert!(properties::get_property(&pool, "k").await.unwrap().is_none());
    properties::set_property(&pool, "k", "v1").await.unwrap();
    properties::set_property(&pool, "k", "v2").await.unwrap();
    assert_eq!(
        properties::get_property(&pool, "k").await.unwrap().as_deref(),
        Some("v2")
    );
    assert!(properties::delete_property(&pool, "k").await.unwrap());
    assert!(!properties::delete_property(&pool, "k").await.unwrap());

    db.destroy().await;
}

#[tokio::test]
async fn grants_upsert_and_revoke() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();

    grants::upsert_grant(&pool, "a@b.com", "view").await.unwrap();
    grants::upsert_grant(&pool, "a@b.com", "edit").await.unwrap();

    let all = grants::list_grants(&pool).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].level, "edit");

    assert!(grants::delete_grant(&pool, "a@b.com").await.unwrap());
    assert!(grants::list_grants(&pool).await.unwrap().is_empty());

    db.destroy().await;
}

#[tokio::test]
async fn summary_counts_plans_admin_sheets_and_side_tables() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();

    // Already created by the fixture, so this is a no-op.
    pool::ensure_database_exists(&db.config).await.unwrap();

    sheets::insert_sheet(&pool, "current", false).await.unwrap();
    sheets::insert_sheet(&pool, "_template", true).await.unwrap();
    sheets::insert_sheet(&pool, "_permissions", true).await.unwrap();
    cells::replace_cells(
        &pool,
        "current",
        WHOLE,
        &[cell(1, 1, json!("name")), cell(1, 2, json!("Now"))],
    )
    .await
    .unwrap();
    properties::set_property(&pool, "share_token:abc", "{}").await.unwrap();
    grants::upsert_grant(&pool, "a@b.com", "view").await.unwrap();

    assert_eq!(
        pool::store_summary(&pool).await.unwrap(),
        StoreSummary {
            visible_sheets: 1,
            hidden_sheets: 2,
            cells: 2,
            properties: 1,
            grants: 1,
        }
    );

    db.destroy().await;
}
