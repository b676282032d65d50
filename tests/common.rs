//! Test utilities & fixtures shared by the grove integration tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use moodgrove::grove::{GroveRules, GroveStore, GroveStoreBuilder, Stage, TreeRecord};
use tempfile::TempDir;

/// Fixed clock origin so cooldown and expiry assertions are deterministic.
#[allow(dead_code)]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn at(offset: Duration) -> DateTime<Utc> {
    t0() + offset
}

/// Throwaway store with default rules. Keep the `TempDir` alive for the test's duration.
#[allow(dead_code)]
pub fn open_store() -> (TempDir, GroveStore) {
    open_store_with(GroveRules::default())
}

#[allow(dead_code)]
pub fn open_store_with(rules: GroveRules) -> (TempDir, GroveStore) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = GroveStoreBuilder::new(tmp.path().join("grove"))
        .with_rules(rules)
        .open()
        .expect("open store");
    (tmp, store)
}

/// Push a tree to at least `stage` through encouragements, which bypass the check-in cooldown.
#[allow(dead_code)]
pub fn grow_to(store: &GroveStore, tree_id: &str, stage: Stage) -> TreeRecord {
    let mut tree = store.get_tree(tree_id).expect("tree");
    while tree.stage() < stage {
        tree = store.receive_encouragement_at(tree_id, t0()).expect("encourage");
    }
    tree
}

/// Plant a tree for `user` and grow it to `stage`.
#[allow(dead_code)]
pub fn planted_at_stage(store: &GroveStore, user: &str, stage: Stage) -> TreeRecord {
    let tree = store.plant_tree_at(user, true, t0()).expect("plant");
    grow_to(store, &tree.id, stage)
}
