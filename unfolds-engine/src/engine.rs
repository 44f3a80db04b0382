//! The engine facade: owns the working set, the claimed set and the reward
//! code issuer, and keeps them in step with storage.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::claim::{self, ClaimEligibility, ClaimReceipt, ClaimedSet};
use crate::clock::Timestamp;
use crate::constants::{
    KEY_CLAIMED_STEPS, KEY_QUEST_DATABASE, KEY_REWARD_SEQUENCE, KEY_UNFOLD_STORIES,
};
use crate::error::{EngineError, NotFoundError, PersistenceError, ValidationError};
use crate::geo::Coordinate;
use crate::model::{SchemaKind, Step, StepId, Story, StoryId};
use crate::moderation::{self, ModerationFilter, ReviewRecord, ReviewRequest};
use crate::progress::EngineEvent;
use crate::query::{self, QueryContext, StepFilter, StepSort, StoryGroup};
use crate::reward_code::{IssuerState, RewardCodeIssuer};
use crate::schema::{
    LegacyDatabase, StoryDocument, UnfoldStory, from_legacy, from_unfold, parse_documents,
    to_legacy, to_unfold,
};
use crate::storage::{KeyValueStore, StoryLoader, encode_json, read_json, remove_all, write_all};

/// What an import added and what it passed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: Vec<StoryId>,
    /// Stories whose id was already loaded.
    pub skipped: Vec<StoryId>,
}

/// Quest engine bound to a storage backend.
pub struct QuestEngine<S>
where
    S: KeyValueStore,
{
    store: S,
    stories: Vec<Story>,
    claimed: ClaimedSet,
    issuer: RewardCodeIssuer,
    user: Option<Coordinate>,
    events: Vec<EngineEvent>,
}

impl<S> QuestEngine<S>
where
    S: KeyValueStore,
{
    /// An empty engine. `seed` keys the reward-code issuer when storage holds
    /// no issuer state.
    #[must_use]
    pub fn new(store: S, seed: u64) -> Self {
        Self {
            store,
            stories: Vec::new(),
            claimed: ClaimedSet::new(),
            issuer: RewardCodeIssuer::from_seed(seed),
            user: None,
            events: Vec::new(),
        }
    }

    /// Restore the claimed set, stored stories and issuer from storage.
    ///
    /// Every key falls back to its empty default when it is missing or cannot
    /// be read; the failure is logged and loading continues.
    #[must_use]
    pub fn load(store: S, seed: u64) -> Self {
        let mut engine = Self::new(store, seed);
        engine.claimed = load_or_default(&engine.store, KEY_CLAIMED_STEPS).unwrap_or_default();
        if let Some(state) = load_or_default::<IssuerState, _>(&engine.store, KEY_REWARD_SEQUENCE) {
            engine.issuer = RewardCodeIssuer::restore(state);
        }

        let mut stories = Vec::new();
        if let Some(db) = load_or_default::<LegacyDatabase, _>(&engine.store, KEY_QUEST_DATABASE) {
            stories.extend(db.quests.iter().filter_map(|quest| {
                from_legacy(quest)
                    .inspect_err(|err| {
                        log::warn!("skipping stored quest {:?}: {err}", quest.story.name);
                    })
                    .ok()
            }));
        }
        if let Some(docs) =
            load_or_default::<Vec<UnfoldStory>, _>(&engine.store, KEY_UNFOLD_STORIES)
        {
            stories.extend(docs.iter().filter_map(|doc| {
                from_unfold(doc)
                    .inspect_err(|err| log::warn!("skipping stored story {:?}: {err}", doc.title))
                    .ok()
            }));
        }
        for story in stories {
            match Self::admits(&engine.stories, &story) {
                Ok(true) => engine.stories.push(story),
                Ok(false) => log::warn!("stored story {} appears twice", story.id()),
                Err(err) => log::warn!("skipping stored story {}: {err}", story.id()),
            }
        }
        log::info!(
            "loaded {} stories and {} claims",
            engine.stories.len(),
            engine.claimed.len()
        );
        engine
    }

    /// Merge documents from a bundled source into the working set. A failing
    /// source yields an empty import.
    ///
    /// # Errors
    ///
    /// Returns an error if a document fails validation or the working set
    /// cannot be persisted.
    pub fn load_from<L: StoryLoader>(
        &mut self,
        loader: &L,
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        match loader.load_documents() {
            Ok(docs) => self.import_documents(&docs, now),
            Err(err) => {
                log::warn!("story source unavailable, continuing without it: {err}");
                Ok(ImportSummary::default())
            }
        }
    }

    #[must_use]
    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.stories.iter().flat_map(Story::steps)
    }

    #[must_use]
    pub const fn claimed(&self) -> &ClaimedSet {
        &self.claimed
    }

    #[must_use]
    pub const fn user_location(&self) -> Option<Coordinate> {
        self.user
    }

    #[must_use]
    pub const fn issuer_sequence(&self) -> u64 {
        self.issuer.sequence()
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] for an unknown id.
    pub fn step(&self, id: &str) -> Result<&Step, NotFoundError> {
        self.steps()
            .find(|step| step.id().as_str() == id)
            .ok_or_else(|| NotFoundError::step(id))
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] for an unknown id.
    pub fn story(&self, id: &str) -> Result<&Story, NotFoundError> {
        self.stories
            .iter()
            .find(|story| story.id().as_str() == id)
            .ok_or_else(|| NotFoundError::story(id))
    }

    fn story_index(&self, id: &str) -> Result<usize, NotFoundError> {
        self.stories
            .iter()
            .position(|story| story.id().as_str() == id)
            .ok_or_else(|| NotFoundError::story(id))
    }

    fn step_position(&self, id: &str) -> Result<(usize, usize), NotFoundError> {
        self.stories
            .iter()
            .enumerate()
            .find_map(|(si, story)| {
                story
                    .steps()
                    .iter()
                    .position(|step| step.id().as_str() == id)
                    .map(|pi| (si, pi))
            })
            .ok_or_else(|| NotFoundError::step(id))
    }

    /// Parse and import a JSON payload (single story, bundle, or array).
    ///
    /// # Errors
    ///
    /// Returns a validation error if any document is malformed or collides,
    /// or a persistence error if the result cannot be stored. Nothing is
    /// imported on error.
    pub fn import_json(
        &mut self,
        json: &str,
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        let docs = parse_documents(json)?;
        self.import_documents(&docs, now)
    }

    /// Import a single document.
    ///
    /// # Errors
    ///
    /// Same conditions as [`QuestEngine::import_json`].
    pub fn import_document(
        &mut self,
        doc: &StoryDocument,
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        self.import_documents(std::slice::from_ref(doc), now)
    }

    fn import_documents(
        &mut self,
        docs: &[StoryDocument],
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        let normalized = docs
            .iter()
            .map(StoryDocument::normalize)
            .collect::<Result<Vec<_>, _>>()?;
        self.add_stories(normalized, now)
    }

    /// Add already-normalized stories (e.g. freshly authored ones).
    ///
    /// # Errors
    ///
    /// Same conditions as [`QuestEngine::import_json`].
    pub fn add_stories(
        &mut self,
        stories: Vec<Story>,
        now: Timestamp,
    ) -> Result<ImportSummary, EngineError> {
        let mut summary = ImportSummary::default();
        let mut next = self.stories.clone();
        for mut story in stories {
            if !Self::admits(&next, &story)? {
                log::warn!("story {} already loaded, skipping", story.id());
                summary.skipped.push(story.id().clone());
                continue;
            }
            if let Some(user) = self.user {
                query::update_distances(story.steps_mut(), user);
            }
            summary.imported.push(story.id().clone());
            next.push(story);
        }
        if summary.imported.is_empty() {
            return Ok(summary);
        }
        self.persist(&next, None, None, now)?;
        self.stories = next;
        log::info!("imported {} stories", summary.imported.len());
        Ok(summary)
    }

    /// `Ok(false)` when the story id is already present; an error when one of
    /// its step ids is taken by another story.
    fn admits(current: &[Story], story: &Story) -> Result<bool, ValidationError> {
        if current.iter().any(|s| s.id() == story.id()) {
            return Ok(false);
        }
        let taken: BTreeSet<&StepId> = current
            .iter()
            .flat_map(Story::steps)
            .map(Step::id)
            .collect();
        match story.steps().iter().find(|step| taken.contains(step.id())) {
            Some(step) => Err(ValidationError::DuplicateStep {
                id: step.id().clone(),
                story: story.title.clone(),
            }),
            None => Ok(true),
        }
    }

    /// Record the user's position and refresh every step's distance.
    pub fn update_location(&mut self, user: Coordinate) {
        self.user = Some(user);
        for story in &mut self.stories {
            query::update_distances(story.steps_mut(), user);
        }
    }

    /// The `n` nearest steps; empty until a location is known.
    #[must_use]
    pub fn nearest(&self, n: usize) -> Vec<&Step> {
        if self.user.is_none() {
            return Vec::new();
        }
        let mut ranked = self.query(StepFilter::All, StepSort::Distance, Timestamp::MIN_UTC);
        ranked.truncate(n);
        ranked
    }

    fn context(&self, as_of: Timestamp) -> QueryContext<'_> {
        QueryContext {
            user: self.user,
            claimed: &self.claimed,
            as_of,
        }
    }

    /// Filtered and sorted view over all steps.
    #[must_use]
    pub fn query(&self, filter: StepFilter, sort: StepSort, as_of: Timestamp) -> Vec<&Step> {
        let ctx = self.context(as_of);
        let mut steps = query::filter_steps(self.steps(), filter, &ctx);
        query::sort_steps(&mut steps, sort, &ctx);
        steps
    }

    /// [`QuestEngine::query`] grouped by story.
    #[must_use]
    pub fn grouped(
        &self,
        filter: StepFilter,
        sort: StepSort,
        as_of: Timestamp,
    ) -> Vec<StoryGroup<'_>> {
        let steps = self.query(filter, sort, as_of);
        query::group_by_story(&steps, &self.context(as_of))
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] for an unknown step.
    pub fn evaluate(
        &self,
        step_id: &str,
        as_of: Timestamp,
    ) -> Result<ClaimEligibility, NotFoundError> {
        let step = self.step(step_id)?;
        Ok(claim::evaluate(step, self.user, &self.claimed, as_of))
    }

    /// Claim a step at the current location.
    ///
    /// The claim runs on copies; the claimed set, the story collection and the
    /// issuer sequence are persisted before the copies replace live state, so
    /// a failed write leaves the engine exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown step,
    /// [`EngineError::Claim`] naming the failed precondition, or
    /// [`EngineError::Persistence`] if storage rejects the update.
    pub fn claim(&mut self, step_id: &str, as_of: Timestamp) -> Result<ClaimReceipt, EngineError> {
        let (si, pi) = self.step_position(step_id)?;
        let mut story = self.stories[si].clone();
        let mut claimed = self.claimed.clone();
        let mut issuer = self.issuer.clone();
        let receipt = claim::claim(
            &mut story.steps_mut()[pi],
            self.user,
            &mut claimed,
            as_of,
            &mut issuer,
        )?;

        let mut next = self.stories.clone();
        next[si] = story;
        self.persist(&next, Some(&claimed), Some(&issuer), as_of)?;

        self.stories = next;
        self.claimed = claimed;
        self.issuer = issuer;

        let story = &self.stories[si];
        let step = &story.steps()[pi];
        self.events.push(EngineEvent::StepClaimed {
            receipt: receipt.clone(),
            story_title: story.title.clone(),
            step_name: step.name.clone(),
            reward_enabled: step.reward.enabled,
        });
        if story
            .steps()
            .iter()
            .all(|s| self.claimed.contains(s.id().as_str()))
        {
            self.events.push(EngineEvent::StoryCompleted {
                story_id: story.id().clone(),
                story_title: story.title.clone(),
                total_distance_meters: story.metadata.total_distance_meters,
                completed_at: as_of,
            });
        }
        log::info!("step {} claimed", receipt.step_id);
        Ok(receipt)
    }

    /// Forget every claim. Reward counters and stories are not touched.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the empty set cannot be stored; the
    /// in-memory set is then left as it was.
    pub fn clear_claims(&mut self) -> Result<usize, EngineError> {
        let empty = ClaimedSet::new();
        write_all(
            &self.store,
            &[(KEY_CLAIMED_STEPS, encode_json(KEY_CLAIMED_STEPS, &empty)?)],
        )?;
        let cleared = claim::clear_all_claims(&mut self.claimed);
        log::info!("cleared {cleared} claims");
        Ok(cleared)
    }

    /// Drop every story from memory and storage. Claims are kept.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if either story key cannot be removed;
    /// both keys and the working set are then left as they were.
    pub fn clear_database(&mut self) -> Result<usize, EngineError> {
        remove_all(&self.store, &[KEY_QUEST_DATABASE, KEY_UNFOLD_STORIES])?;
        let removed = self.stories.len();
        self.stories.clear();
        log::info!("cleared {removed} stories");
        Ok(removed)
    }

    /// Submit a story for publication.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown ids, illegal transitions or storage
    /// failures.
    pub fn submit_story(&mut self, story_id: &str, now: Timestamp) -> Result<(), EngineError> {
        self.update_story(story_id, now, |story| {
            moderation::submit(story, now).map(|_| ())
        })
    }

    /// Apply a moderator decision.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown ids, non-pending stories or storage
    /// failures.
    pub fn review_story(
        &mut self,
        story_id: &str,
        request: ReviewRequest,
        now: Timestamp,
    ) -> Result<ReviewRecord, EngineError> {
        let mut record = None;
        self.update_story(story_id, now, |story| {
            record = Some(moderation::review(story, request, now)?);
            Ok(())
        })?;
        record.ok_or_else(|| NotFoundError::story(story_id).into())
    }

    /// # Errors
    ///
    /// Returns an error for unknown ids, non-published stories or storage
    /// failures.
    pub fn archive_story(&mut self, story_id: &str, now: Timestamp) -> Result<(), EngineError> {
        self.update_story(story_id, now, moderation::archive)
    }

    fn update_story<F>(
        &mut self,
        story_id: &str,
        now: Timestamp,
        apply: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&mut Story) -> Result<(), ValidationError>,
    {
        let index = self.story_index(story_id)?;
        let mut next = self.stories.clone();
        apply(&mut next[index])?;
        self.persist(&next, None, None, now)?;
        self.stories = next;
        Ok(())
    }

    /// Moderation queue over the working set.
    #[must_use]
    pub fn moderation_queue(&self, filter: ModerationFilter, now: Timestamp) -> Vec<&Story> {
        moderation::moderation_queue(&self.stories, filter, now)
    }

    /// Working set in the legacy `questDatabase` shape.
    #[must_use]
    pub fn export_legacy(&self, now: Timestamp) -> LegacyDatabase {
        LegacyDatabase::from_quests(self.stories.iter().map(to_legacy).collect(), now)
    }

    /// Working set in the newer story shape.
    #[must_use]
    pub fn export_unfold(&self) -> Vec<UnfoldStory> {
        self.stories.iter().map(to_unfold).collect()
    }

    /// Take every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    fn persist(
        &self,
        stories: &[Story],
        claimed: Option<&ClaimedSet>,
        issuer: Option<&RewardCodeIssuer>,
        now: Timestamp,
    ) -> Result<(), PersistenceError> {
        let mut writes = Vec::with_capacity(4);
        if let Some(claimed) = claimed {
            writes.push((KEY_CLAIMED_STEPS, encode_json(KEY_CLAIMED_STEPS, claimed)?));
        }
        let legacy: Vec<_> = stories
            .iter()
            .filter(|story| story.origin == SchemaKind::Legacy)
            .map(to_legacy)
            .collect();
        let unfold: Vec<_> = stories
            .iter()
            .filter(|story| story.origin == SchemaKind::Unfold)
            .map(to_unfold)
            .collect();
        writes.push((
            KEY_QUEST_DATABASE,
            encode_json(KEY_QUEST_DATABASE, &LegacyDatabase::from_quests(legacy, now))?,
        ));
        writes.push((KEY_UNFOLD_STORIES, encode_json(KEY_UNFOLD_STORIES, &unfold)?));
        if let Some(issuer) = issuer {
            writes.push((
                KEY_REWARD_SEQUENCE,
                encode_json(KEY_REWARD_SEQUENCE, &issuer.state())?,
            ));
        }
        write_all(&self.store, &writes)
    }
}

fn load_or_default<T, S>(store: &S, key: &str) -> Option<T>
where
    T: serde::de::DeserializeOwned,
    S: KeyValueStore,
{
    match read_json(store, key) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("falling back to empty {key}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap()
    }

    fn quest() -> String {
        json!({
            "id": "quest_1727773200000_pk7l00p",
            "createdAt": "2024-10-01T09:00:00.000Z",
            "story": {
                "name": "Park Loop", "description": "Loop", "reward": "Free coffee at the end"
            },
            "steps": [
                {"name": "Gate", "coordinates": {"x": 40.7128, "y": -74.0070}, "claimingRadius": 100,
                 "reward": {"enabled": true, "limited": true, "quantity": 1, "claimedCount": 0}},
                {"name": "Fountain", "coordinates": {"x": 40.7138, "y": -74.0070}, "claimingRadius": 100}
            ]
        })
        .to_string()
    }

    fn engine() -> QuestEngine<MemoryStore> {
        let mut engine = QuestEngine::new(MemoryStore::new(), 11);
        engine.import_json(&quest(), now()).unwrap();
        engine.update_location(Coordinate::new(40.7128, -74.0060).unwrap());
        engine
    }

    #[test]
    fn duplicate_import_is_skipped() {
        let mut engine = engine();
        let summary = engine.import_json(&quest(), now()).unwrap();
        assert!(summary.imported.is_empty());
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(engine.stories().len(), 1);
    }

    #[test]
    fn step_id_collision_is_rejected() {
        let mut engine = engine();
        let clash = json!({
            "title": "Other",
            "steps": [{"id": "park-loop-1", "name": "x", "geo": {"lat": 1.0, "lng": 1.0}}]
        });
        let err = engine.import_json(&clash.to_string(), now()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::DuplicateStep { .. })
        ));
        assert_eq!(engine.stories().len(), 1);
    }

    #[test]
    fn claim_persists_and_emits_events() {
        let mut engine = engine();
        let receipt = engine.claim("park-loop-1", now()).unwrap();
        assert_eq!(receipt.remaining, Some(0));
        assert!(engine.store().raw(KEY_CLAIMED_STEPS).unwrap().contains("park-loop-1"));
        let events = engine.drain_events();
        assert_eq!(events.len(), 1);

        let err = engine.claim("park-loop-1", now()).unwrap_err();
        assert_eq!(err.claim_failure(), Some(crate::error::ClaimFailure::AlreadyClaimed));

        // the second step is ~140 m from the user, outside its 100 m radius
        let err = engine.claim("park-loop-2", now()).unwrap_err();
        assert_eq!(err.claim_failure(), Some(crate::error::ClaimFailure::TooFar));
        engine.update_location(Coordinate::new(40.7138, -74.0070).unwrap());
        engine.claim("park-loop-2", now()).unwrap();
        let events = engine.drain_events();
        assert!(matches!(events.last(), Some(EngineEvent::StoryCompleted { .. })));
    }

    #[test]
    fn failed_persist_leaves_memory_unchanged() {
        let mut engine = engine();
        engine.store().fail_writes_to(KEY_REWARD_SEQUENCE);
        let err = engine.claim("park-loop-1", now()).unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(engine.claimed().is_empty());
        assert_eq!(engine.step("park-loop-1").unwrap().reward.claimed_count, 0);
        assert_eq!(engine.issuer_sequence(), 0);
        assert!(engine.drain_events().is_empty());
        assert_eq!(engine.store().raw(KEY_CLAIMED_STEPS), None);
    }

    #[test]
    fn reload_restores_claims_counts_and_sequence() {
        let mut engine = engine();
        engine.claim("park-loop-1", now()).unwrap();
        let sequence = engine.issuer_sequence();
        let reloaded = QuestEngine::load(engine.store().clone(), 99);
        assert!(reloaded.claimed().contains("park-loop-1"));
        assert_eq!(reloaded.step("park-loop-1").unwrap().reward.claimed_count, 1);
        assert_eq!(reloaded.issuer_sequence(), sequence);
    }

    #[test]
    fn corrupt_storage_falls_back_to_empty() {
        let store = MemoryStore::new();
        store.set(KEY_CLAIMED_STEPS, "not json").unwrap();
        store.set(KEY_UNFOLD_STORIES, "{}").unwrap();
        let engine = QuestEngine::load(store, 1);
        assert!(engine.claimed().is_empty());
        assert!(engine.stories().is_empty());
    }

    #[test]
    fn clearing_claims_keeps_counters() {
        let mut engine = engine();
        engine.claim("park-loop-1", now()).unwrap();
        assert_eq!(engine.clear_claims().unwrap(), 1);
        assert!(engine.claimed().is_empty());
        assert_eq!(engine.step("park-loop-1").unwrap().reward.claimed_count, 1);
        let err = engine.claim("park-loop-1", now()).unwrap_err();
        assert_eq!(err.claim_failure(), Some(crate::error::ClaimFailure::NotAvailable));
    }

    #[test]
    fn clearing_database_keeps_claims() {
        let mut engine = engine();
        engine.claim("park-loop-1", now()).unwrap();
        assert_eq!(engine.clear_database().unwrap(), 1);
        assert!(engine.stories().is_empty());
        assert_eq!(engine.store().raw(KEY_QUEST_DATABASE), None);
        assert!(engine.claimed().contains("park-loop-1"));
        assert!(matches!(
            engine.claim("park-loop-1", now()),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn claiming_keeps_quest_header_in_storage() {
        let mut engine = engine();
        engine.claim("park-loop-1", now()).unwrap();
        let stored: LegacyDatabase =
            serde_json::from_str(&engine.store().raw(KEY_QUEST_DATABASE).unwrap()).unwrap();
        let quest = &stored.quests[0];
        assert_eq!(quest.story.reward.as_deref(), Some("Free coffee at the end"));
        assert_eq!(quest.id.as_deref(), Some("quest_1727773200000_pk7l00p"));
        assert_eq!(quest.created_at.as_deref(), Some("2024-10-01T09:00:00.000Z"));
        assert_eq!(quest.steps[0].reward.claimed_count, 1);
    }

    #[test]
    fn archived_legacy_story_stays_archived_after_reload() {
        let mut engine = engine();
        engine.archive_story("legacy_park-loop", now()).unwrap();
        let reloaded = QuestEngine::load(engine.store().clone(), 11);
        let story = reloaded.story("legacy_park-loop").unwrap();
        assert_eq!(story.status, crate::model::StoryStatus::Archived);
        assert_eq!(story.origin, SchemaKind::Legacy);
    }

    #[test]
    fn incomplete_story_cannot_be_submitted() {
        let mut engine = engine();
        let draft = json!({"id": "uf_x", "title": " ", "status": "draft", "steps": []});
        engine.import_json(&draft.to_string(), now()).unwrap();
        let err = engine.submit_story("uf_x", now()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::NotPublishable(_))
        ));
        let story = engine.story("uf_x").unwrap();
        assert_eq!(story.status, crate::model::StoryStatus::Draft);
        let reloaded = QuestEngine::load(engine.store().clone(), 11);
        assert_eq!(
            reloaded.story("uf_x").unwrap().status,
            crate::model::StoryStatus::Draft
        );
    }

    #[test]
    fn clearing_database_is_all_or_nothing() {
        let mut engine = engine();
        let before = engine.store().raw(KEY_QUEST_DATABASE);
        assert!(before.is_some());
        engine.store().fail_writes_to(KEY_UNFOLD_STORIES);
        let err = engine.clear_database().unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert_eq!(engine.store().raw(KEY_QUEST_DATABASE), before);
        assert_eq!(engine.stories().len(), 1);

        engine.store().heal();
        assert_eq!(engine.clear_database().unwrap(), 1);
        assert_eq!(engine.store().raw(KEY_UNFOLD_STORIES), None);
    }

    #[test]
    fn nearest_requires_location() {
        let mut engine = QuestEngine::new(MemoryStore::new(), 1);
        engine.import_json(&quest(), now()).unwrap();
        assert!(engine.nearest(3).is_empty());
        engine.update_location(Coordinate::new(40.7138, -74.0070).unwrap());
        assert_eq!(engine.nearest(1)[0].name, "Fountain");
    }
}
