use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use unfolds_engine::constants::{KEY_CLAIMED_STEPS, KEY_REWARD_SEQUENCE};
use unfolds_engine::{
    ClaimFailure, Coordinate, EngineError, EngineEvent, MemoryStore, ProgressLedger, QuestEngine,
    SchemaKind, StepDraft, Story, UserProfile, is_user_in_radius,
};

const DATABASE: &str = include_str!("fixtures/legacy_quest.json");
const UNFOLDS: &str = include_str!("fixtures/unfold_story.json");

fn june() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

fn at(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat, lng).unwrap()
}

fn loaded(store: MemoryStore) -> QuestEngine<MemoryStore> {
    let mut engine = QuestEngine::load(store, 0x0DDB_A11);
    engine.import_json(DATABASE, june()).unwrap();
    engine.import_json(UNFOLDS, june()).unwrap();
    engine
}

#[test]
fn proximity_scenario_near_city_hall() {
    let mut story = Story::new("s", "Scenario", SchemaKind::Legacy);
    let wide = story
        .push_step(StepDraft::new("wide", at(40.7128, -74.0070), 100.0))
        .unwrap()
        .clone();
    let narrow = story
        .push_step(StepDraft::new("narrow", at(40.7128, -74.0070), 50.0))
        .unwrap()
        .clone();
    let user = at(40.7128, -74.0060);
    assert!(is_user_in_radius(user, &wide));
    assert!(!is_user_in_radius(user, &narrow));
}

#[test]
fn single_unit_reward_claims_exactly_once() {
    let mut engine = loaded(MemoryStore::new());
    engine.update_location(at(40.7128, -74.0070));

    let receipt = engine.claim("harbor-walk-1", june()).unwrap();
    assert_eq!(receipt.claimed_count, 1);
    assert_eq!(receipt.remaining, Some(0));
    assert!(receipt.reward_code.starts_with("REWARD-"));

    let err = engine.claim("harbor-walk-1", june()).unwrap_err();
    assert_eq!(err.claim_failure(), Some(ClaimFailure::AlreadyClaimed));
    assert_eq!(
        engine.step("harbor-walk-1").unwrap().reward.claimed_count,
        1
    );
}

#[test]
fn exhausted_counts_survive_for_the_next_visitor() {
    let store = MemoryStore::new();
    let mut engine = loaded(store.clone());
    engine.update_location(at(40.7128, -74.0070));
    engine.claim("harbor-walk-1", june()).unwrap();
    engine.clear_claims().unwrap();

    let mut next = QuestEngine::load(store, 5);
    next.update_location(at(40.7128, -74.0070));
    let err = next.claim("harbor-walk-1", june()).unwrap_err();
    assert_eq!(err.claim_failure(), Some(ClaimFailure::NotAvailable));
}

#[test]
fn claim_checks_run_in_order() {
    let mut engine = loaded(MemoryStore::new());

    // no location yet
    let err = engine.claim("village-loop-1", june()).unwrap_err();
    assert_eq!(err.claim_failure(), Some(ClaimFailure::TooFar));

    // out of window beats distance
    engine.update_location(at(40.7013, -74.0132));
    let july = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    let err = engine.claim("harbor-walk-2", july).unwrap_err();
    assert_eq!(err.claim_failure(), Some(ClaimFailure::NotAvailable));

    let receipt = engine.claim("harbor-walk-2", june()).unwrap();
    assert_eq!(receipt.reward_code, "FERRY-10");
    assert_eq!(receipt.remaining, None);

    engine.update_location(at(40.7045, -74.01));
    let err = engine.claim("harbor-walk-3", june()).unwrap_err();
    assert_eq!(err.claim_failure(), Some(ClaimFailure::NotAvailable));

    assert!(matches!(
        engine.claim("no-such-step", june()),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn clear_claims_keeps_reward_counters() {
    let mut engine = loaded(MemoryStore::new());
    engine.update_location(at(40.7527, -73.9896));
    engine.claim("st_mural_a", june()).unwrap();
    let before: Vec<u32> = engine.steps().map(|s| s.reward.claimed_count).collect();

    assert_eq!(engine.clear_claims().unwrap(), 1);
    assert!(engine.claimed().is_empty());
    let after: Vec<u32> = engine.steps().map(|s| s.reward.claimed_count).collect();
    assert_eq!(before, after);
    assert_eq!(engine.store().raw(KEY_CLAIMED_STEPS).as_deref(), Some("[]"));
}

#[test]
fn storage_failure_rolls_back_every_key() {
    let store = MemoryStore::new();
    let mut engine = loaded(store.clone());
    engine.update_location(at(40.7527, -73.9896));
    let database_before = store.raw(unfolds_engine::constants::KEY_UNFOLD_STORIES);

    store.fail_writes_to(KEY_REWARD_SEQUENCE);
    let err = engine.claim("st_mural_a", june()).unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(engine.claimed().is_empty());
    assert_eq!(engine.step("st_mural_a").unwrap().reward.claimed_count, 2);
    assert_eq!(
        store.raw(unfolds_engine::constants::KEY_UNFOLD_STORIES),
        database_before
    );

    store.heal();
    let receipt = engine.claim("st_mural_a", june()).unwrap();
    assert_eq!(receipt.remaining, Some(0));
    assert!(receipt.reward_code.starts_with("MURAL-1"));
}

#[test]
fn reward_codes_stay_unique_across_reloads() {
    let store = MemoryStore::new();
    let mut codes = HashSet::new();
    for round in 0..3 {
        let mut engine = QuestEngine::load(store.clone(), 77);
        if round == 0 {
            engine.import_json(DATABASE, june()).unwrap();
        }
        engine.update_location(at(40.7013, -74.0132));
        engine.clear_claims().unwrap();
        // the ferry step has a fixed code, so add a generated one
        let story = r#"{"title": "Pier", "id": "uf_pier", "steps": [
            {"id": "st_pier", "name": "Pier", "geo": {"lat": 40.7013, "lng": -74.0132},
             "step_reward": {"enabled": true}}]}"#;
        engine.import_json(story, june()).unwrap();
        let receipt = engine.claim("st_pier", june()).unwrap();
        assert!(codes.insert(receipt.reward_code), "round {round} repeated a code");
    }
}

#[test]
fn events_feed_the_progress_ledger() {
    let mut engine = loaded(MemoryStore::new());
    let mut ledger = ProgressLedger::new(UserProfile::new("user_1", "walker", june()));

    engine.update_location(at(40.7308, -73.9973));
    engine.claim("village-loop-1", june()).unwrap();
    engine.update_location(at(40.7128, -74.0070));
    engine.claim("harbor-walk-1", june()).unwrap();

    let events = engine.drain_events();
    assert!(matches!(events[1], EngineEvent::StoryCompleted { .. }));
    for event in &events {
        ledger.record(event);
    }
    assert!(engine.drain_events().is_empty());

    let stats = ledger.stats();
    assert_eq!(stats.steps_completed, 2);
    assert_eq!(stats.rewards_earned, 1);
    assert_eq!(stats.stories_completed, 1);
    assert_eq!(ledger.rewards[0].step_name, "Battery Park Gate");
    assert_eq!(ledger.completed[0].title, "Village Loop");
}
