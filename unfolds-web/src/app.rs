//! Discovery page state: the engine, the signed-in user's progress, and the
//! view models the page renders.

use serde::Serialize;
use unfolds_engine::availability::{RewardStock, WindowPhase, reward_stock, window_phase};
use unfolds_engine::claim::{self, StepState, StepStatus};
use unfolds_engine::constants::{
    DEFAULT_NEAREST_COUNT, KEY_COMPLETED_STORIES, KEY_CURRENT_USER, KEY_REWARDS,
};
use unfolds_engine::progress::{CompletedStoryRecord, RewardRecord};
use unfolds_engine::query::search_steps;
use unfolds_engine::storage::{encode_json, read_json, write_all};
use unfolds_engine::{
    Achievement, ClaimFailure, Coordinate, DistanceBand, EngineError, ImportSummary,
    KeyValueStore, PersistenceError, ProgressLedger, QuestEngine, Step, StepFilter, StepSort,
    StoryLoader, Timestamp, UserProfile, UserStats, format_distance, normalize_json,
};

/// One row in the step list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepCard {
    pub id: String,
    pub story_id: String,
    pub name: String,
    pub story_name: String,
    pub description: String,
    pub distance: Option<String>,
    pub band: Option<DistanceBand>,
    pub status: StepStatus,
    pub button_label: &'static str,
    pub state: StepState,
    pub window: WindowPhase,
    pub stock: RewardStock,
}

/// A story header with its visible steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryCard {
    pub story_id: String,
    pub story_name: String,
    pub total: usize,
    pub claimed: usize,
    pub available: usize,
    pub steps: Vec<StepCard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimOutcome {
    pub claimed: bool,
    pub message: String,
    pub reward_code: Option<String>,
    pub failure: Option<ClaimFailure>,
}

/// Discovery state over any [`KeyValueStore`].
pub struct Discovery<S>
where
    S: KeyValueStore,
{
    engine: QuestEngine<S>,
    ledger: ProgressLedger,
}

impl<S> Discovery<S>
where
    S: KeyValueStore,
{
    /// Restore engine state and the current user's records from `store`,
    /// creating a profile on first visit.
    #[must_use]
    pub fn open(store: S, seed: u64, now: Timestamp) -> Self {
        let engine = QuestEngine::load(store, seed);
        let ledger = load_ledger(engine.store(), now);
        Self { engine, ledger }
    }

    /// Import bundled stories when storage held none.
    ///
    /// # Errors
    /// Returns an error when a bundled document is invalid or cannot be
    /// persisted.
    pub fn seed_if_empty<L: StoryLoader>(
        &mut self,
        loader: &L,
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        if !self.engine.stories().is_empty() {
            return Ok(ImportSummary::default());
        }
        self.engine.load_from(loader, now)
    }

    #[must_use]
    pub const fn engine(&self) -> &QuestEngine<S> {
        &self.engine
    }

    #[must_use]
    pub const fn profile(&self) -> &UserProfile {
        &self.ledger.profile
    }

    #[must_use]
    pub const fn stats(&self) -> &UserStats {
        self.ledger.stats()
    }

    #[must_use]
    pub fn achievements(&self) -> Vec<Achievement> {
        self.ledger.achievements()
    }

    #[must_use]
    pub fn rewards(&self) -> &[RewardRecord] {
        &self.ledger.rewards
    }

    pub fn update_location(&mut self, user: Coordinate) {
        self.engine.update_location(user);
    }

    fn card(&self, step: &Step, now: Timestamp) -> StepCard {
        let eligibility = claim::evaluate(
            step,
            self.engine.user_location(),
            self.engine.claimed(),
            now,
        );
        let status = eligibility.status();
        StepCard {
            id: step.id().to_string(),
            story_id: step.story_id().to_string(),
            name: step.name.clone(),
            story_name: step.story_name.clone(),
            description: step.description.clone(),
            distance: eligibility.distance_meters.map(format_distance),
            band: eligibility.distance_meters.map(DistanceBand::classify),
            status,
            button_label: status.label(),
            state: claim::step_state(step, self.engine.claimed(), now),
            window: window_phase(step, now),
            stock: reward_stock(step),
        }
    }

    #[must_use]
    pub fn step_cards(&self, filter: StepFilter, sort: StepSort, now: Timestamp) -> Vec<StepCard> {
        self.engine
            .query(filter, sort, now)
            .into_iter()
            .map(|step| self.card(step, now))
            .collect()
    }

    #[must_use]
    pub fn story_cards(
        &self,
        filter: StepFilter,
        sort: StepSort,
        now: Timestamp,
    ) -> Vec<StoryCard> {
        self.engine
            .grouped(filter, sort, now)
            .into_iter()
            .map(|group| StoryCard {
                story_id: group.story_id.to_string(),
                story_name: group.story_name,
                total: group.total,
                claimed: group.claimed,
                available: group.available,
                steps: group.steps.iter().map(|step| self.card(step, now)).collect(),
            })
            .collect()
    }

    #[must_use]
    pub fn nearest_cards(&self, now: Timestamp) -> Vec<StepCard> {
        self.engine
            .nearest(DEFAULT_NEAREST_COUNT)
            .into_iter()
            .map(|step| self.card(step, now))
            .collect()
    }

    #[must_use]
    pub fn search(&self, query: &str, now: Timestamp) -> Vec<StepCard> {
        search_steps(self.engine.steps(), query)
            .into_iter()
            .map(|step| self.card(step, now))
            .collect()
    }

    /// Claim a step and fold the resulting events into the user's progress.
    pub fn claim(&mut self, step_id: &str, now: Timestamp) -> ClaimOutcome {
        match self.engine.claim(step_id, now) {
            Ok(receipt) => {
                for event in self.engine.drain_events() {
                    self.ledger.record(&event);
                }
                if let Err(err) = save_ledger(self.engine.store(), &self.ledger) {
                    log::warn!("progress not saved: {err}");
                }
                ClaimOutcome {
                    claimed: true,
                    message: format!("Reward claimed! Your code: {}", receipt.reward_code),
                    reward_code: Some(receipt.reward_code),
                    failure: None,
                }
            }
            Err(err) => ClaimOutcome {
                claimed: false,
                message: err.to_string(),
                reward_code: None,
                failure: err.claim_failure(),
            },
        }
    }

    /// # Errors
    /// Returns a persistence error if storage rejects the update.
    pub fn clear_claims(&mut self) -> Result<usize, EngineError> {
        self.engine.clear_claims()
    }

    /// # Errors
    /// Returns a persistence error if storage rejects the removal.
    pub fn clear_database(&mut self) -> Result<usize, EngineError> {
        self.engine.clear_database()
    }

    /// Import stories written elsewhere; they do not count as created.
    ///
    /// # Errors
    /// Returns an error for invalid or colliding documents.
    pub fn import_json(
        &mut self,
        json: &str,
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        self.engine.import_json(json, now)
    }

    /// Save stories authored by the signed-in user and credit them.
    ///
    /// # Errors
    /// Returns an error for invalid or colliding documents.
    pub fn save_authored(
        &mut self,
        json: &str,
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        let mut stories = normalize_json(json)?;
        for story in &mut stories {
            story
                .author_id
                .get_or_insert_with(|| self.ledger.profile.id.clone());
            story.created_at.get_or_insert(now);
        }
        let summary = self.engine.add_stories(stories, now)?;
        for _ in &summary.imported {
            self.ledger.record_story_created();
        }
        if let Err(err) = save_ledger(self.engine.store(), &self.ledger) {
            log::warn!("progress not saved: {err}");
        }
        Ok(summary)
    }

    /// Legacy-shaped export of the working set, pretty-printed.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn export_legacy_json(&self, now: Timestamp) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.engine.export_legacy(now))
    }
}

fn load_ledger<S: KeyValueStore>(store: &S, now: Timestamp) -> ProgressLedger {
    let profile = read_or_warn::<UserProfile, _>(store, KEY_CURRENT_USER).unwrap_or_else(|| {
        let profile = UserProfile::new(
            format!("user_{}", now.timestamp_millis()),
            "Explorer",
            now,
        );
        log::info!("created profile {}", profile.id);
        profile
    });
    ProgressLedger::from_records(
        profile,
        read_or_warn(store, KEY_REWARDS).unwrap_or_default(),
        read_or_warn(store, KEY_COMPLETED_STORIES).unwrap_or_default(),
    )
}

fn read_or_warn<T, S>(store: &S, key: &str) -> Option<T>
where
    T: serde::de::DeserializeOwned,
    S: KeyValueStore,
{
    read_json(store, key)
        .inspect_err(|err| log::warn!("ignoring stored {key}: {err}"))
        .ok()
        .flatten()
}

/// Persist the ledger, keeping other users' entries in the shared lists.
fn save_ledger<S: KeyValueStore>(
    store: &S,
    ledger: &ProgressLedger,
) -> Result<(), PersistenceError> {
    let user = &ledger.profile.id;
    let mut rewards: Vec<RewardRecord> = read_or_warn(store, KEY_REWARDS).unwrap_or_default();
    rewards.retain(|r| &r.user_id != user);
    rewards.extend(ledger.rewards.iter().cloned());
    let mut completed: Vec<CompletedStoryRecord> =
        read_or_warn(store, KEY_COMPLETED_STORIES).unwrap_or_default();
    completed.retain(|c| &c.user_id != user);
    completed.extend(ledger.completed.iter().cloned());

    write_all(
        store,
        &[
            (KEY_CURRENT_USER, encode_json(KEY_CURRENT_USER, &ledger.profile)?),
            (KEY_REWARDS, encode_json(KEY_REWARDS, &rewards)?),
            (
                KEY_COMPLETED_STORIES,
                encode_json(KEY_COMPLETED_STORIES, &completed)?,
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::FetchedStories;
    use chrono::{TimeZone, Utc};
    use unfolds_engine::MemoryStore;

    const QUEST: &str = r#"{"story": {"name": "Gallery Row", "description": "Two doors"},
        "steps": [
            {"name": "Blue Door", "description": "d", "coordinates": {"x": 40.7128, "y": -74.007},
             "claimingRadius": 100, "reward": {"enabled": true, "limited": true, "quantity": 5}},
            {"name": "Red Door", "description": "d", "coordinates": {"x": 40.72, "y": -74.0},
             "claimingRadius": 20}
        ]}"#;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 9, 9, 18, 0, 0).unwrap()
    }

    fn discovery(store: MemoryStore) -> Discovery<MemoryStore> {
        let mut discovery = Discovery::open(store, 4, now());
        let loader = FetchedStories::new().with_payload("database.json", QUEST);
        discovery.seed_if_empty(&loader, now()).unwrap();
        discovery
    }

    #[test]
    fn cards_reflect_location() {
        let mut discovery = discovery(MemoryStore::new());
        let cards = discovery.step_cards(StepFilter::All, StepSort::Name, now());
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().all(|c| c.distance.is_none()));
        assert_eq!(cards[0].button_label, "Too Far Away");

        discovery.update_location(Coordinate::new(40.7128, -74.0060).unwrap());
        let nearest = discovery.nearest_cards(now());
        assert_eq!(nearest[0].name, "Blue Door");
        assert_eq!(nearest[0].distance.as_deref(), Some("84m"));
        assert_eq!(nearest[0].band, Some(DistanceBand::Close));
        assert_eq!(nearest[0].button_label, "Claim Reward");
        assert_eq!(
            nearest[0].stock,
            RewardStock::Limited {
                remaining: 5,
                quantity: 5
            }
        );
    }

    #[test]
    fn claim_records_progress_and_persists_it() {
        let store = MemoryStore::new();
        let mut discovery = discovery(store.clone());
        discovery.update_location(Coordinate::new(40.7128, -74.0060).unwrap());
        let outcome = discovery.claim("gallery-row-1", now());
        assert!(outcome.claimed, "{}", outcome.message);
        assert!(outcome.message.contains(outcome.reward_code.as_deref().unwrap()));
        assert_eq!(discovery.stats().steps_completed, 1);

        let again = discovery.claim("gallery-row-1", now());
        assert_eq!(again.failure, Some(ClaimFailure::AlreadyClaimed));

        let reopened = Discovery::open(store, 4, now());
        assert_eq!(reopened.profile().id, discovery.profile().id);
        assert_eq!(reopened.rewards().len(), 1);
        assert_eq!(reopened.engine().stories().len(), 1);
    }

    #[test]
    fn seeding_skips_when_storage_has_stories() {
        let store = MemoryStore::new();
        let _ = discovery(store.clone());
        let mut reopened = Discovery::open(store, 4, now());
        let loader = FetchedStories::new().with_payload("database.json", "not json");
        let summary = reopened.seed_if_empty(&loader, now()).unwrap();
        assert!(summary.imported.is_empty());
    }

    #[test]
    fn broken_bundle_falls_back_to_empty() {
        let mut discovery = Discovery::open(MemoryStore::new(), 4, now());
        let loader = FetchedStories::new().with_payload("database.json", "{");
        let summary = discovery.seed_if_empty(&loader, now()).unwrap();
        assert!(summary.imported.is_empty());
        assert!(discovery.engine().stories().is_empty());
    }

    #[test]
    fn search_and_export() {
        let mut discovery = discovery(MemoryStore::new());
        assert_eq!(discovery.search("red", now()).len(), 1);
        let summary = discovery
            .import_json(r#"{"title": "Annex", "steps": []}"#, now())
            .unwrap();
        assert_eq!(summary.imported.len(), 1);
        let exported = discovery.export_legacy_json(now()).unwrap();
        assert!(exported.contains("\"totalQuests\": 2"));
    }

    #[test]
    fn only_authored_stories_count_as_created() {
        let store = MemoryStore::new();
        let mut discovery = discovery(store.clone());
        assert_eq!(discovery.stats().stories_created, 0);
        discovery
            .import_json(r#"{"title": "Borrowed", "steps": []}"#, now())
            .unwrap();
        assert_eq!(discovery.stats().stories_created, 0);

        let summary = discovery
            .save_authored(r#"{"title": "My Walk", "steps": []}"#, now())
            .unwrap();
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(discovery.stats().stories_created, 1);
        let mine = discovery.engine().story(summary.imported[0].as_str()).unwrap();
        assert_eq!(mine.author_id.as_deref(), Some(discovery.profile().id.as_str()));

        let reopened = Discovery::open(store, 4, now());
        assert_eq!(reopened.stats().stories_created, 1);
    }
}
