use chrono::{TimeZone, Utc};
use std::hash::Hasher;
use twox_hash::XxHash64;
use unfolds_engine::constants::{KEY_QUEST_DATABASE, KEY_UNFOLD_STORIES};
use unfolds_engine::schema::{LegacyQuest, from_legacy, to_legacy, to_unfold};
use unfolds_engine::{
    Availability, Difficulty, MemoryStore, QuestEngine, SchemaKind, StoryDocument, StoryStatus,
    normalize_json, parse_documents,
};

const DATABASE: &str = include_str!("fixtures/legacy_quest.json");
const UNFOLDS: &str = include_str!("fixtures/unfold_story.json");

fn snapshot_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

#[test]
fn legacy_fixture_round_trips_numbers_exactly() {
    let docs = parse_documents(DATABASE).unwrap();
    assert_eq!(docs.len(), 2);
    for doc in docs {
        let StoryDocument::Legacy(original) = doc else {
            panic!("expected legacy quests");
        };
        let exported = to_legacy(&from_legacy(&original).unwrap());
        assert_eq!(exported.id, original.id);
        assert_eq!(exported.created_at, original.created_at);
        assert_eq!(exported.story.reward, original.story.reward);
        assert_eq!(exported.status, None);
        assert_eq!(exported.steps.len(), original.steps.len());
        for (before, after) in original.steps.iter().zip(&exported.steps) {
            assert_eq!(before.coordinates.x, after.coordinates.x);
            assert_eq!(before.coordinates.y, after.coordinates.y);
            assert_eq!(before.claiming_radius, after.claiming_radius);
            assert_eq!(before.reward.claimed_count, after.reward.claimed_count);
            assert_eq!(before.reward.quantity, after.reward.quantity);
            assert_eq!(before.reward.code, after.reward.code);
        }
    }
}

#[test]
fn legacy_windows_keep_their_instants() {
    let quest: LegacyQuest = match parse_documents(DATABASE).unwrap().remove(0) {
        StoryDocument::Legacy(quest) => quest,
        StoryDocument::Unfold(_) => panic!("expected a legacy quest"),
    };
    let story = from_legacy(&quest).unwrap();
    let window = story.steps()[1].claiming_window.unwrap();
    assert_eq!(
        window.starts_at(),
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    );
    let exported = to_legacy(&story);
    assert!(exported.steps[1].claiming_window.enabled);
    assert_eq!(
        exported.steps[1].claiming_window.due_date.as_deref(),
        Some("2024-06-30T21:00:00.000Z")
    );
    assert!(!exported.steps[0].claiming_window.enabled);
}

#[test]
fn legacy_quests_normalize_to_published_public_stories() {
    let stories = normalize_json(DATABASE).unwrap();
    let harbor = &stories[0];
    assert_eq!(harbor.id().as_str(), "legacy_harbor-walk");
    assert_eq!(harbor.origin, SchemaKind::Legacy);
    assert_eq!(harbor.status, StoryStatus::Published);
    assert_eq!(harbor.availability, Availability::Public);
    let ids: Vec<_> = harbor.steps().iter().map(|s| s.id().as_str()).collect();
    assert_eq!(ids, ["harbor-walk-1", "harbor-walk-2", "harbor-walk-3"]);
    assert!(harbor.steps().iter().all(|s| s.story_name == "Harbor Walk"));
}

#[test]
fn unfold_fixture_orders_steps_and_derives_counts() {
    let stories = normalize_json(UNFOLDS).unwrap();
    let murals = &stories[0];
    assert_eq!(murals.origin, SchemaKind::Unfold);
    assert_eq!(murals.status, StoryStatus::Published);
    assert_eq!(murals.metadata.total_steps, 2);
    assert_eq!(murals.metadata.difficulty, Difficulty::Easy);
    let names: Vec<_> = murals.steps().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Garment District Wall", "Tunnel Mural"]);

    let first = &murals.steps()[0];
    assert_eq!(first.reward.claimed_count, 2);
    assert_eq!(first.claiming_radius_meters, 25.0);
    assert!(murals.steps()[1].claiming_window.is_none());

    let exported = to_unfold(murals);
    assert_eq!(exported.steps[0].step_reward.remaining, Some(1));
    assert_eq!(exported.steps[0].step_reward.coupon_prefix.as_deref(), Some("MURAL"));
    assert_eq!(exported.id.as_deref(), Some("uf_midtown_murals"));
}

#[test]
fn half_open_window_is_rejected() {
    let doc = r#"{"title": "Broken", "steps": [{"name": "a", "geo": {"lat": 1, "lng": 1},
        "time_window": {"start_at": "2024-01-01T00:00:00Z", "due_at": null}}]}"#;
    assert!(normalize_json(doc).is_err());

    let inverted = r#"{"story": {"name": "Inverted"}, "steps": [{"name": "a",
        "coordinates": {"x": 1, "y": 1}, "claimingRadius": 10,
        "claimingWindow": {"enabled": true, "startDate": "2024-02-01T00:00:00Z",
                           "dueDate": "2024-01-01T00:00:00Z"}}]}"#;
    assert!(normalize_json(inverted).is_err());
}

#[test]
fn persisted_export_is_stable_across_reload() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let store = MemoryStore::new();
    let mut engine = QuestEngine::new(store.clone(), 3);
    engine.import_json(DATABASE, now).unwrap();
    engine.import_json(UNFOLDS, now).unwrap();
    assert!(store.raw(KEY_QUEST_DATABASE).is_some());
    assert!(store.raw(KEY_UNFOLD_STORIES).is_some());

    let canonical = serde_json::to_string_pretty(&engine.export_legacy(now)).unwrap();
    let digest = snapshot_hash(canonical.as_bytes());

    let reloaded = QuestEngine::load(store, 3);
    assert_eq!(reloaded.stories().len(), 3);
    let again = serde_json::to_string_pretty(&reloaded.export_legacy(now)).unwrap();
    assert_eq!(
        snapshot_hash(again.as_bytes()),
        digest,
        "legacy export changed across reload\n{again}"
    );
    assert_eq!(reloaded.export_unfold(), engine.export_unfold());
}
