//! The core components over the Postgres store.
//!
//! Each test creates an isolated temporary database through
//! `orgchart-test-utils` and drops it on completion.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use orgchart_core::OrgError;
use orgchart_core::clock::SystemClock;
use orgchart_core::permission::access::{AccessSync, RetryPolicy};
use orgchart_core::permission::{Caller, Permission};
use orgchart_core::plan::{Node, Plan};
use orgchart_core::service::PlanService;
use orgchart_core::settings::Settings;
use orgchart_core::store::{PgStore, Range, TabularStore};
use orgchart_db::queries::grants;
use orgchart_test_utils::ScratchDb;

fn two_level_plan() -> Plan {
    let root = Node::new("ceo");
    let mut child = Node::new("cto");
    child.parent_id = Some("ceo".into());
    child.level = 1;
    child.x = 40.25;
    Plan {
        name: "Current".into(),
        period: "2026-04".into(),
        memo: String::new(),
        nodes: vec![root, child],
    }
}

#[tokio::test]
async fn service_round_trip_over_postgres() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();
    let store = Arc::new(PgStore::new(pool.clone()));
    let policy = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
    };
    let (access, _worker) = AccessSync::spawn(store.clone(), policy, CancellationToken::new());
    let service = PlanService::from_store(
        store.clone(),
        access.clone(),
        Arc::new(SystemClock),
        &Settings::default(),
    );
    let owner = Caller::new("owner@example.com");

    service
        .save_plan(&owner, "current", &two_level_plan())
        .await
        .unwrap();
    let view = service.list_all_plans(&owner).await.unwrap();
    let current = &view.plans["current"];
    assert_eq!(current.period, "2026-04");
    assert_eq!(current.node("cto").unwrap().parent_id.as_deref(), Some("ceo"));
    assert_eq!(current.node("cto").unwrap().x, 40.25);

    service
        .add_shared_user(&owner, "a@b.com", Permission::Edit)
        .await
        .unwrap();
    access.flush().await;
    let mirrored = grants::list_grants(&pool).await.unwrap();
    assert!(mirrored.iter().any(|g| g.email == "a@b.com" && g.level == "edit"));

    let link = service.generate_share_link(&owner).await.unwrap();
    let entry = service
        .resolve_entry(&Caller::anonymous(), Some(&link.token))
        .await
        .unwrap();
    assert!(entry.via_share_token);

    assert!(matches!(
        service.delete_plan(&owner, "current").await,
        Err(OrgError::ReservedPlan(_))
    ));

    db.destroy().await;
}

#[tokio::test]
async fn pg_store_delete_row_and_append() {
    let db = ScratchDb::create().await;
    let pool = db.pool.clone();
    let store = PgStore::new(pool.clone());

    store.create_sheet("t", true).await.unwrap();
    for v in ["a", "b", "c"] {
        store.append_row("t", vec![v.into()]).await.unwrap();
    }
    store.delete_row("t", 2).await.unwrap();

    let rows = store.read_range("t", Range::new(1, 1, 3, 1)).await.unwrap();
    assert_eq!(
        rows,
        vec![vec![json!("a")], vec![json!("c")], vec![json!(null)]]
    );
    assert_eq!(store.last_row("t").await.unwrap(), 2);

    db.destroy().await;
}
