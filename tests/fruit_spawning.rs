//! Integration tests for fruit spawning, capacity and collection.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Duration;
use common::{at, open_store, open_store_with, planted_at_stage, t0};
use moodgrove::grove::{FruitBundle, FruitKind, GroveError, GroveRules, Stage};

#[test]
fn seed_trees_never_bear_fruit() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();
    assert!(!store.should_spawn_at(&tree.id, t0()).unwrap());
    assert!(store.spawn_if_due_at(&tree.id, t0()).unwrap().is_empty());
    assert!(store.spawn_at(&tree.id, t0()).unwrap().is_empty());
}

#[test]
fn sprout_spawns_one_unlocked_fruit_then_waits() {
    let (_tmp, store) = open_store();
    let tree = planted_at_stage(&store, "alice", Stage::Sprout);

    let spawned = store.spawn_if_due_at(&tree.id, t0()).unwrap();
    assert_eq!(spawned.len(), 1);
    let fruit = &spawned[0];
    assert_eq!(fruit.fruit_type, "apple");
    assert_eq!(fruit.tree_id, tree.id);
    assert_eq!(fruit.spawned_at, t0());
    assert!(!fruit.is_collected);
    assert!((10.0..=90.0).contains(&fruit.position_x));
    assert!((10.0..=90.0).contains(&fruit.position_y));

    // Full (capacity 1) long after the interval
    assert!(store
        .spawn_if_due_at(&tree.id, at(Duration::hours(48)))
        .unwrap()
        .is_empty());
    assert_eq!(store.uncollected_fruits(&tree.id).unwrap().len(), 1);
}

#[test]
fn blooming_respects_interval_and_capacity() {
    let (_tmp, store) = open_store();
    let tree = planted_at_stage(&store, "alice", Stage::Blooming);

    assert_eq!(store.spawn_if_due_at(&tree.id, t0()).unwrap().len(), 1);
    assert!(store
        .spawn_if_due_at(&tree.id, at(Duration::hours(3)))
        .unwrap()
        .is_empty());

    for step in 1..=10 {
        store
            .spawn_if_due_at(&tree.id, at(Duration::hours(4 * step)))
            .unwrap();
    }
    let state = store.spawn_state(&tree.id).unwrap();
    assert_eq!(state.uncollected, 5);
    assert_eq!(state.total_spawned, 5);
    assert_eq!(store.uncollected_fruits(&tree.id).unwrap().len(), 5);
    assert!(!store.should_spawn_at(&tree.id, at(Duration::hours(100))).unwrap());
}

#[test]
fn spawn_batch_is_capped_by_remaining_capacity() {
    let mut rules = GroveRules::default();
    rules.spawn.spawn_batch = 3;
    let (_tmp, store) = open_store_with(rules);
    let tree = planted_at_stage(&store, "alice", Stage::Blooming);

    assert_eq!(store.spawn_if_due_at(&tree.id, t0()).unwrap().len(), 3);
    assert_eq!(
        store
            .spawn_if_due_at(&tree.id, at(Duration::hours(4)))
            .unwrap()
            .len(),
        2
    );
    assert_eq!(store.list_fruits(&tree.id).unwrap().len(), 5);
}

#[test]
fn collecting_credits_inventory_and_frees_capacity() {
    let (_tmp, store) = open_store();
    let tree = planted_at_stage(&store, "alice", Stage::Sprout);
    let fruit = store.spawn_if_due_at(&tree.id, t0()).unwrap().remove(0);

    let outcome = store
        .collect_at(&fruit.id, "alice", at(Duration::minutes(5)))
        .unwrap();
    assert_eq!(outcome.quantity, 1);
    assert!(outcome.fruit.is_collected);
    assert_eq!(outcome.fruit.collected_by.as_deref(), Some("alice"));
    assert_eq!(outcome.fruit.collected_at, Some(at(Duration::minutes(5))));
    assert_eq!(store.quantity("alice", "apple").unwrap(), 1);
    assert_eq!(store.get_fruit(&fruit.id).unwrap(), outcome.fruit);

    let err = store.collect_at(&fruit.id, "bob", at(Duration::minutes(6))).unwrap_err();
    assert!(matches!(err, GroveError::AlreadyCollected(_)));
    assert!(!err.is_retryable());
    assert_eq!(store.quantity("bob", "apple").unwrap(), 0);

    // Capacity is free again but the interval still applies
    assert!(store
        .spawn_if_due_at(&tree.id, at(Duration::hours(1)))
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .spawn_if_due_at(&tree.id, at(Duration::hours(24)))
            .unwrap()
            .len(),
        1
    );
    assert_eq!(store.list_fruits(&tree.id).unwrap().len(), 2);
    assert_eq!(store.uncollected_fruits(&tree.id).unwrap().len(), 1);
}

#[test]
fn collecting_unknown_fruit_is_not_found() {
    let (_tmp, store) = open_store();
    assert!(matches!(
        store.collect_at("no-such-fruit", "alice", t0()),
        Err(GroveError::NotFound(_))
    ));
}

#[test]
fn concurrent_spawns_never_exceed_capacity() {
    let (_tmp, store) = open_store();
    let tree = planted_at_stage(&store, "alice", Stage::Blooming);
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let tree_id = tree.id.clone();
            thread::spawn(move || {
                barrier.wait();
                store.spawn_at(&tree_id, t0()).unwrap().len()
            })
        })
        .collect();
    let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(created, 5);
    assert_eq!(store.uncollected_fruits(&tree.id).unwrap().len(), 5);
    assert_eq!(store.spawn_state(&tree.id).unwrap().uncollected, 5);
}

#[test]
fn growth_unlocks_rarer_fruit() {
    let (_tmp, store) = open_store();
    let tree = planted_at_stage(&store, "alice", Stage::Blooming);
    let catalog: Vec<String> = store
        .rules()
        .spawn
        .catalog
        .iter()
        .map(|kind| kind.name.clone())
        .collect();

    for round in 0..20 {
        let now = at(Duration::hours(4 * round));
        for fruit in store.spawn_at(&tree.id, now).unwrap() {
            assert!(catalog.contains(&fruit.fruit_type));
            store.collect_at(&fruit.id, "alice", now).unwrap();
        }
    }
    let inventory = store.inventory_for("alice").unwrap();
    assert_eq!(inventory.values().sum::<u64>(), 20);
}

#[test]
fn mixed_case_catalog_names_stay_tradeable() {
    let mut rules = GroveRules::default();
    rules.spawn.catalog = vec![FruitKind::new("Apple", Stage::Sprout, 1)];
    let (_tmp, store) = open_store_with(rules);
    let tree = planted_at_stage(&store, "alice", Stage::Sprout);

    let fruit = store.spawn_at(&tree.id, t0()).unwrap().remove(0);
    assert_eq!(fruit.fruit_type, "apple");
    let outcome = store.collect_at(&fruit.id, "alice", t0()).unwrap();
    assert_eq!(outcome.quantity, 1);
    assert_eq!(store.quantity("alice", "Apple").unwrap(), 1);

    let offered: FruitBundle = [("apple".to_string(), 1)].into_iter().collect();
    let requested: FruitBundle = [("cherry".to_string(), 1)].into_iter().collect();
    assert!(store
        .create_trade_at("alice", &offered, &requested, 24, t0())
        .is_ok());
}
