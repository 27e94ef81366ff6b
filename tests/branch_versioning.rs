use arbor_db_rust::config::AppConfig;
use arbor_db_rust::model::Timestamp;
use arbor_db_rust::registry::Registry;
use arbor_db_rust::store::traits::{BranchStore, EdgeStore};
use arbor_db_rust::store::MemoryStore;
use serde_json::json;

fn ts(value: &str) -> Timestamp {
    Timestamp::parse(Some(value)).unwrap()
}

/// The full isolated-branch lifecycle: an isolated fork keeps seeing the
/// origin as it was at the fork point, and a rebase moves that window
/// forward.
#[tokio::test]
async fn isolated_branch_sees_fork_time_until_rebased() {
    let store = MemoryStore::new();
    let registry = Registry::new(&AppConfig::default());
    registry.initialize(&store).await.unwrap();

    let t0 = ts("2024-01-01T00:00:00Z");
    let t1 = ts("2024-01-10T00:00:00Z");
    let t2 = ts("2024-01-20T00:00:00Z");
    let t3 = ts("2024-01-25T00:00:00Z");
    let t4 = ts("2024-02-01T00:00:00Z");
    let t5 = ts("2024-02-05T00:00:00Z");

    // widget created on main at t0
    store.add_node("W1", "TestWidget").await;
    store
        .set_attribute("W1", "name", json!("original"), "main", &t0)
        .await;

    // feature forks from main at t1, isolated
    let mut feature = registry
        .create_branch(&store, "feature", None, true)
        .await
        .unwrap();
    feature.branched_from = t1;
    feature.created_at = t1;
    store.upsert_branch(feature.clone()).await.unwrap();
    registry.set_branch(feature.clone()).await;

    // main moves on at t2
    store
        .set_attribute("W1", "name", json!("renamed"), "main", &t2)
        .await;

    // main sees the new value immediately
    let main = registry.get_branch("main", &store).await.unwrap();
    let on_main = store
        .resolve_attribute(&main, &t3, &"W1".to_string(), "name")
        .await
        .unwrap();
    assert_eq!(on_main, Some(json!("renamed")));

    // the isolated branch still sees the world as of its fork point
    let on_feature = store
        .resolve_attribute(&feature, &t3, &"W1".to_string(), "name")
        .await
        .unwrap();
    assert_eq!(on_feature, Some(json!("original")));

    // rebase advances the fork point to t4
    feature.rebase(&t4, &registry, &store).await.unwrap();
    assert_eq!(feature.branched_from, t4);

    // the refreshed registry entry carries the new fork point
    let cached = registry.get_branch("feature", &store).await.unwrap();
    assert_eq!(cached.branched_from, t4);

    // now the t2 value is visible from the branch
    let after_rebase = store
        .resolve_attribute(&feature, &t5, &"W1".to_string(), "name")
        .await
        .unwrap();
    assert_eq!(after_rebase, Some(json!("renamed")));
}

/// A branch's own edits shadow the origin's data and survive a rebase
/// when they predate the rebase point.
#[tokio::test]
async fn own_edits_shadow_the_origin_and_survive_rebase() {
    let store = MemoryStore::new();
    let registry = Registry::new(&AppConfig::default());
    registry.initialize(&store).await.unwrap();

    let t0 = ts("2024-01-01T00:00:00Z");
    let t1 = ts("2024-01-10T00:00:00Z");
    let t2 = ts("2024-01-15T00:00:00Z");
    let t3 = ts("2024-01-20T00:00:00Z");
    let t4 = ts("2024-02-01T00:00:00Z");

    store.add_node("W1", "TestWidget").await;
    store
        .set_attribute("W1", "name", json!("original"), "main", &t0)
        .await;

    let mut feature = registry
        .create_branch(&store, "feature", None, true)
        .await
        .unwrap();
    feature.branched_from = t1;
    feature.created_at = t1;
    store.upsert_branch(feature.clone()).await.unwrap();
    registry.set_branch(feature.clone()).await;

    // the branch renames the widget at t2
    store
        .set_attribute("W1", "name", json!("feature-name"), "feature", &t2)
        .await;

    let before_rebase = store
        .resolve_attribute(&feature, &t3, &"W1".to_string(), "name")
        .await
        .unwrap();
    assert_eq!(before_rebase, Some(json!("feature-name")));

    // rebase at t4: the branch edit predates the rebase point, so it is
    // extended rather than discarded
    feature.rebase(&t4, &registry, &store).await.unwrap();

    let after_rebase = store
        .resolve_attribute(&feature, &t4, &"W1".to_string(), "name")
        .await
        .unwrap();
    assert_eq!(after_rebase, Some(json!("feature-name")));
}

/// Conflict losers marked `drop` disappear on rebase and the origin value
/// shows through again.
#[tokio::test]
async fn dropped_conflict_edges_are_removed_by_rebase() {
    let store = MemoryStore::new();
    let registry = Registry::new(&AppConfig::default());
    registry.initialize(&store).await.unwrap();

    let t0 = ts("2024-01-01T00:00:00Z");
    let t1 = ts("2024-01-10T00:00:00Z");
    let t2 = ts("2024-01-15T00:00:00Z");
    let t4 = ts("2024-02-01T00:00:00Z");
    let t5 = ts("2024-02-05T00:00:00Z");

    store.add_node("W1", "TestWidget").await;
    store
        .set_attribute("W1", "name", json!("original"), "main", &t0)
        .await;

    let mut feature = registry
        .create_branch(&store, "feature", None, true)
        .await
        .unwrap();
    feature.branched_from = t1;
    feature.created_at = t1;
    store.upsert_branch(feature.clone()).await.unwrap();
    registry.set_branch(feature.clone()).await;

    let losing_edge = store
        .set_attribute("W1", "name", json!("conflicted"), "feature", &t2)
        .await;
    store.mark_conflict_drop(&losing_edge).await;

    let actions = feature.rebase(&t4, &registry, &store).await.unwrap();
    assert_eq!(actions.delete, vec![losing_edge]);

    let after_rebase = store
        .resolve_attribute(&feature, &t5, &"W1".to_string(), "name")
        .await
        .unwrap();
    assert_eq!(after_rebase, Some(json!("original")));
}
