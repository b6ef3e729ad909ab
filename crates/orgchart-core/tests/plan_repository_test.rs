//! Integration tests for the plan repository over the in-memory store.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use orgchart_core::OrgError;
use orgchart_core::clock::ManualClock;
use orgchart_core::plan::{CURRENT_PLAN_ID, Node, NodePatch, NodeUpdate, Plan, PlanRepository};
use orgchart_core::settings::PlanSettings;
use orgchart_core::store::{MemoryStore, TabularStore};

fn fixed_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap(),
    ))
}

fn repository(store: &Arc<MemoryStore>) -> PlanRepository {
    PlanRepository::new(store.clone(), fixed_clock(), PlanSettings::default())
}

fn node(id: &str, parent: Option<&str>) -> Node {
    let mut node = Node::new(id);
    node.name = format!("name of {id}");
    node.parent_id = parent.map(str::to_string);
    node
}

fn sample_plan() -> Plan {
    let mut ceo = node("n1", None);
    ceo.position = "CEO".into();
    ceo.grade = "E1".into();
    ceo.employment = "full-time".into();
    ceo.x = 120.5;
    ceo.y = -40.0;
    ceo.is_arranged = true;
    let mut cto = node("n2", Some("n1"));
    cto.level = 1;
    cto.node_type = "new".into();
    Plan {
        name: "Current org".into(),
        period: "2026-04".into(),
        memo: "after the spring reshuffle".into(),
        nodes: vec![ceo, cto],
    }
}

#[tokio::test]
async fn save_then_read_round_trips_with_defaults() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    let plan = sample_plan();

    repo.save("proposal-q1", &plan).await.unwrap();
    let loaded = repo.get("proposal-q1").await.unwrap();

    let stamped = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
    let mut expected = plan.clone();
    for n in &mut expected.nodes {
        n.updated_at = Some(stamped);
    }
    assert_eq!(loaded, expected);
}

#[tokio::test]
async fn text_fields_keep_surrounding_whitespace() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    let mut lead = node(" n1 ", None);
    lead.name = "  Ada ".into();
    lead.position = "Lead\n".into();
    lead.grade = " G3".into();
    lead.employment = "contract \r\n".into();
    lead.node_type = " new ".into();
    let mut report = node("n2", Some(" n1 "));
    report.name = "\tBob".into();
    let plan = Plan {
        name: " Q1 ".into(),
        period: "2026-04 ".into(),
        memo: "line1\nline2\n".into(),
        nodes: vec![lead, report],
    };

    repo.save("spaced", &plan).await.unwrap();
    let loaded = repo.get("spaced").await.unwrap();

    let stamped = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
    let mut expected = plan.clone();
    for n in &mut expected.nodes {
        n.updated_at = Some(stamped);
    }
    assert_eq!(loaded, expected);
    assert_eq!(loaded.node("n2").unwrap().parent_id.as_deref(), Some(" n1 "));
}

#[tokio::test]
async fn omitted_fields_read_back_as_defaults() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    let plan: Plan = serde_json::from_str(r#"{"name":"bare","nodes":[{"id":"a"}]}"#).unwrap();

    repo.save("bare", &plan).await.unwrap();
    let node = &repo.get("bare").await.unwrap().nodes[0];

    assert_eq!(node.node_type, "existing");
    assert_eq!(node.level, 0);
    assert_eq!((node.x, node.y), (0.0, 0.0));
    assert!(node.parent_id.is_none());
    assert!(!node.is_arranged);
}

#[tokio::test]
async fn new_plans_are_cloned_from_hidden_template() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);

    repo.save("a", &sample_plan()).await.unwrap();
    repo.save("b", &sample_plan()).await.unwrap();

    let sheets = store.list_sheets().await.unwrap();
    let names: Vec<_> = sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["_template", "a", "b"]);
    assert!(sheets[0].hidden);
    assert!(!sheets[1].hidden);

    let all = repo.list_all().await.unwrap();
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn saving_fewer_nodes_clears_stale_rows() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save("p", &sample_plan()).await.unwrap();

    let mut smaller = sample_plan();
    smaller.nodes.truncate(1);
    repo.save("p", &smaller).await.unwrap();
    assert_eq!(repo.get("p").await.unwrap().nodes.len(), 1);

    smaller.nodes.clear();
    repo.save("p", &smaller).await.unwrap();
    let empty = repo.get("p").await.unwrap();
    assert!(empty.nodes.is_empty());
    assert_eq!(empty.name, "Current org");
}

#[tokio::test]
async fn cache_serves_repeat_reads() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save("p", &sample_plan()).await.unwrap();

    repo.list_all().await.unwrap();
    let reads = store.range_reads();
    repo.list_all().await.unwrap();
    repo.get("p").await.unwrap();
    assert_eq!(store.range_reads(), reads);
}

#[tokio::test]
async fn every_mutation_is_visible_to_the_next_read() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save("p", &sample_plan()).await.unwrap();
    repo.save("q", &sample_plan()).await.unwrap();
    repo.list_all().await.unwrap();

    let mut renamed = sample_plan();
    renamed.name = "Renamed".into();
    repo.save("p", &renamed).await.unwrap();
    assert_eq!(repo.list_all().await.unwrap()["p"].name, "Renamed");

    let update = NodeUpdate {
        id: "n2".into(),
        patch: NodePatch {
            name: Some("Platform lead".into()),
            ..NodePatch::default()
        },
    };
    repo.batch_update("p", &[update]).await.unwrap();
    let plans = repo.list_all().await.unwrap();
    assert_eq!(plans["p"].node("n2").unwrap().name, "Platform lead");

    repo.delete("q").await.unwrap();
    assert!(!repo.list_all().await.unwrap().contains_key("q"));
}

#[tokio::test]
async fn unreachable_store_is_reported_and_not_cached() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save("p", &sample_plan()).await.unwrap();

    store.set_available(false);
    assert!(matches!(
        repo.list_all().await,
        Err(OrgError::StoreAccess(_))
    ));
    assert!(matches!(
        repo.save("p", &sample_plan()).await,
        Err(OrgError::StoreAccess(_))
    ));

    store.set_available(true);
    let reads = store.range_reads();
    assert_eq!(repo.list_all().await.unwrap().len(), 1);
    assert!(store.range_reads() > reads);
}

#[tokio::test]
async fn current_cannot_be_deleted() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save(CURRENT_PLAN_ID, &sample_plan()).await.unwrap();

    assert!(matches!(
        repo.delete(CURRENT_PLAN_ID).await,
        Err(OrgError::ReservedPlan(_))
    ));
    assert!(repo.get(CURRENT_PLAN_ID).await.is_ok());
}

#[tokio::test]
async fn deleting_missing_or_admin_sheets_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save("p", &sample_plan()).await.unwrap();

    assert!(matches!(repo.delete("nope").await, Err(OrgError::NotFound(_))));
    assert!(matches!(
        repo.delete("_template").await,
        Err(OrgError::NotFound(_))
    ));
    assert!(store.sheet("_template").await.unwrap().is_some());
}

#[tokio::test]
async fn batch_update_ignores_unknown_ids() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save("p", &sample_plan()).await.unwrap();
    let before = repo.get("p").await.unwrap();

    let updates = vec![
        NodeUpdate {
            id: "ghost".into(),
            patch: NodePatch {
                name: Some("nobody".into()),
                ..NodePatch::default()
            },
        },
        NodeUpdate {
            id: "n1".into(),
            patch: NodePatch {
                x: Some(5.0),
                ..NodePatch::default()
            },
        },
    ];
    let applied = repo.batch_update("p", &updates).await.unwrap();
    assert_eq!(applied, 1);

    let after = repo.get("p").await.unwrap();
    assert_eq!(after.nodes.len(), before.nodes.len());
    assert_eq!(after.node("n1").unwrap().x, 5.0);
    assert_eq!(after.node("n2"), before.node("n2"));
}

#[tokio::test]
async fn batch_update_can_clear_a_parent() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    repo.save("p", &sample_plan()).await.unwrap();

    let updates: Vec<NodeUpdate> =
        serde_json::from_str(r#"[{"id":"n2","parentId":null,"level":0}]"#).unwrap();
    repo.batch_update("p", &updates).await.unwrap();

    let n2 = repo.get("p").await.unwrap().node("n2").cloned().unwrap();
    assert!(n2.parent_id.is_none());
    assert_eq!(n2.level, 0);
}

#[tokio::test]
async fn batch_update_on_missing_plan_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    assert!(matches!(
        repo.batch_update("nope", &[]).await,
        Err(OrgError::NotFound(_))
    ));
}

#[tokio::test]
async fn tree_integrity_is_enforced_by_default() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);

    let mut dangling = sample_plan();
    dangling.nodes.push(node("n3", Some("missing")));
    assert!(matches!(
        repo.save("p", &dangling).await,
        Err(OrgError::Validation(_))
    ));
    assert!(store.sheet("p").await.unwrap().is_none());

    repo.save("p", &sample_plan()).await.unwrap();
    let cycle = vec![NodeUpdate {
        id: "n1".into(),
        patch: serde_json::from_str(r#"{"parentId":"n2"}"#).unwrap(),
    }];
    assert!(matches!(
        repo.batch_update("p", &cycle).await,
        Err(OrgError::Validation(_))
    ));
    assert!(repo.get("p").await.unwrap().node("n1").unwrap().parent_id.is_none());
}

#[tokio::test]
async fn tree_integrity_can_be_relaxed() {
    let store = Arc::new(MemoryStore::new());
    let settings = PlanSettings {
        enforce_tree_integrity: false,
        ..PlanSettings::default()
    };
    let repo = PlanRepository::new(store.clone(), fixed_clock(), settings);

    let mut dangling = sample_plan();
    dangling.nodes.push(node("n3", Some("missing")));
    repo.save("p", &dangling).await.unwrap();
    assert_eq!(repo.get("p").await.unwrap().nodes.len(), 3);
}

#[tokio::test]
async fn malformed_plan_ids_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(&store);
    for id in ["", "_permissions", "a/b", "with space"] {
        assert!(
            matches!(repo.save(id, &sample_plan()).await, Err(OrgError::Validation(_))),
            "{id:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn concurrent_first_saves_race_last_write_wins() {
    let store = Arc::new(MemoryStore::new());
    store.set_yielding(true);
    let repo = repository(&store);
    let first = Plan {
        name: "first".into(),
        nodes: vec![node("a", None)],
        ..Plan::default()
    };
    let second = Plan {
        name: "second".into(),
        nodes: vec![node("b", None)],
        ..Plan::default()
    };

    let (a, b) = tokio::join!(repo.save("q1", &first), repo.save("q1", &second));
    a.unwrap();
    b.unwrap();

    let names: Vec<_> = store
        .list_sheets()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["_template", "q1"]);
    let loaded = repo.get("q1").await.unwrap();
    assert!(loaded.name == "first" || loaded.name == "second");
    assert_eq!(loaded.nodes.len(), 1);
}
