//! Integration tests for tree growth: check-ins, cooldowns, encouragement and resets.

mod common;

use chrono::Duration;
use common::{at, open_store, t0};
use moodgrove::grove::{stage_of, CheckInInput, ErrorKind, GroveError, Stage};

fn full_input() -> CheckInInput {
    CheckInInput::new(7)
        .with_descriptions(["calm", "grateful", "hopeful", "proud"])
        .with_impacts(["work", "family", "sleep"])
        .with_context("x".repeat(160))
}

#[test]
fn check_in_scores_and_records_history() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();

    let outcome = store
        .check_in_at(&tree.id, "alice", &CheckInInput::new(4), t0())
        .unwrap();
    assert_eq!(outcome.check_in.score, 3);
    assert_eq!(outcome.tree.mood_score(), 3);
    assert_eq!(outcome.tree.last_check_in, Some(t0()));
    assert_eq!(outcome.stage_change, None);

    let stored = store.get_tree(&tree.id).unwrap();
    assert_eq!(stored, outcome.tree);

    let history = store.check_in_history(&tree.id, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].emotion_level, 4);
}

#[test]
fn check_in_cooldown_reports_remaining_time() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();
    store
        .check_in_at(&tree.id, "alice", &CheckInInput::new(4), t0())
        .unwrap();

    let err = store
        .check_in_at(&tree.id, "alice", &CheckInInput::new(4), at(Duration::minutes(30)))
        .unwrap_err();
    assert!(
        matches!(err, GroveError::CooldownActive { remaining } if remaining == Duration::minutes(30)),
        "unexpected: {:?}",
        err
    );
    assert_eq!(err.kind(), ErrorKind::Policy);

    let status = store
        .check_in_status_at(&tree.id, at(Duration::minutes(59)))
        .unwrap();
    assert!(!status.allowed);
    assert_eq!(status.remaining, Duration::minutes(1));

    // Rejected attempt left no trace
    assert_eq!(store.check_in_history(&tree.id, 10).unwrap().len(), 1);
    assert_eq!(store.get_tree(&tree.id).unwrap().mood_score(), 3);

    store
        .check_in_at(&tree.id, "alice", &CheckInInput::new(4), at(Duration::minutes(61)))
        .unwrap();
    assert_eq!(store.get_tree(&tree.id).unwrap().mood_score(), 6);
}

#[test]
fn stage_always_matches_score() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();

    let mut crossings = Vec::new();
    for hour in 0..25 {
        let outcome = store
            .check_in_at(&tree.id, "alice", &full_input(), at(Duration::hours(hour)))
            .unwrap();
        assert_eq!(outcome.check_in.score, 10);
        assert_eq!(outcome.tree.stage(), stage_of(outcome.tree.mood_score()));
        if let Some(change) = outcome.stage_change {
            crossings.push(change);
        }
    }

    let tree = store.get_tree(&tree.id).unwrap();
    assert_eq!(tree.mood_score(), 250);
    assert_eq!(tree.stage(), Stage::Blooming);
    assert_eq!(
        crossings,
        vec![
            (Stage::Seed, Stage::Sprout),
            (Stage::Sprout, Stage::Sapling),
            (Stage::Sapling, Stage::Young),
            (Stage::Young, Stage::Mature),
            (Stage::Mature, Stage::Blooming),
        ]
    );
    let progress = tree.progress(&store.rules().growth.stages);
    assert_eq!(progress.next_stage, None);
    assert_eq!(progress.points_until_next, 0);
}

#[test]
fn only_the_owner_may_check_in() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();
    let err = store
        .check_in_at(&tree.id, "mallory", &CheckInInput::new(5), t0())
        .unwrap_err();
    assert!(matches!(err, GroveError::NotOwner(_)));
    assert!(store.check_in_history(&tree.id, 10).unwrap().is_empty());
}

#[test]
fn malformed_check_ins_are_rejected_before_any_write() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();

    for level in [0u8, 8] {
        let err = store
            .check_in_at(&tree.id, "alice", &CheckInInput::new(level), t0())
            .unwrap_err();
        assert!(matches!(err, GroveError::InvalidCheckIn(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    let long = CheckInInput::new(3).with_context("a".repeat(2001));
    assert!(matches!(
        store.check_in_at(&tree.id, "alice", &long, t0()),
        Err(GroveError::InvalidCheckIn(_))
    ));

    // Validation failures do not start the cooldown
    assert!(store.check_in_status_at(&tree.id, t0()).unwrap().allowed);
}

#[test]
fn tags_are_normalised_before_storage() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();
    let input = CheckInInput::new(4).with_descriptions(["  calm ", "calm", "", "tired"]);
    let outcome = store.check_in_at(&tree.id, "alice", &input, t0()).unwrap();
    assert_eq!(outcome.check_in.descriptions.len(), 2);
    assert!(outcome.check_in.descriptions.contains("calm"));
}

#[test]
fn encouragement_adds_points_without_cooldown() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();
    for _ in 0..10 {
        store.receive_encouragement_at(&tree.id, t0()).unwrap();
    }
    let tree = store.get_tree(&tree.id).unwrap();
    assert_eq!(tree.mood_score(), 20);
    assert_eq!(tree.stage(), Stage::Sprout);
    assert_eq!(tree.last_check_in, None);
}

#[test]
fn reset_is_owner_only_and_daily() {
    let (_tmp, store) = open_store();
    let tree = store.plant_tree_at("alice", false, t0()).unwrap();
    store
        .check_in_at(&tree.id, "alice", &full_input(), t0())
        .unwrap();
    store
        .check_in_at(&tree.id, "alice", &full_input(), at(Duration::hours(1)))
        .unwrap();
    assert_eq!(store.get_tree(&tree.id).unwrap().stage(), Stage::Sprout);

    let err = store
        .reset_tree_at(&tree.id, "mallory", at(Duration::hours(2)))
        .unwrap_err();
    assert!(matches!(err, GroveError::NotOwner(_)));

    let reset = store
        .reset_tree_at(&tree.id, "alice", at(Duration::hours(2)))
        .unwrap();
    assert_eq!(reset.mood_score(), 0);
    assert_eq!(reset.stage(), Stage::Seed);
    assert_eq!(reset.last_reset, Some(at(Duration::hours(2))));
    assert_eq!(store.check_in_history(&tree.id, 10).unwrap().len(), 2);

    let err = store
        .reset_tree_at(&tree.id, "alice", at(Duration::hours(20)))
        .unwrap_err();
    assert!(
        matches!(err, GroveError::CooldownActive { remaining } if remaining == Duration::hours(6)),
        "unexpected: {:?}",
        err
    );

    store
        .reset_tree_at(&tree.id, "alice", at(Duration::hours(26)))
        .unwrap();
}

#[test]
fn planting_is_idempotent_per_user() {
    let (_tmp, store) = open_store();
    let first = store.plant_tree_at("alice", false, t0()).unwrap();
    let again = store.plant_tree_at("alice", true, at(Duration::hours(1))).unwrap();
    assert_eq!(first.id, again.id);
    assert!(!again.is_public);
    assert_eq!(store.tree_for_user("alice").unwrap().id, first.id);
    assert!(matches!(store.tree_for_user("bob"), Err(GroveError::NotFound(_))));
    assert!(matches!(
        store.plant_tree_at("", true, t0()),
        Err(GroveError::InvalidUserId(_))
    ));
}

#[test]
fn public_trees_are_listed_by_score() {
    let (_tmp, store) = open_store();
    let alice = store.plant_tree_at("alice", true, t0()).unwrap();
    let bob = store.plant_tree_at("bob", true, t0()).unwrap();
    let carol = store.plant_tree_at("carol", false, t0()).unwrap();
    store.receive_encouragement_at(&bob.id, t0()).unwrap();
    store.receive_encouragement_at(&carol.id, t0()).unwrap();

    let listed: Vec<String> = store
        .list_public_trees()
        .unwrap()
        .into_iter()
        .map(|tree| tree.owner_id)
        .collect();
    assert_eq!(listed, vec!["bob".to_string(), "alice".to_string()]);

    assert!(matches!(
        store.set_tree_visibility(&alice.id, "bob", false),
        Err(GroveError::NotOwner(_))
    ));
    store.set_tree_visibility(&carol.id, "carol", true).unwrap();
    assert_eq!(store.list_public_trees().unwrap().len(), 3);
}
