//! Claim and completion events, and the user-scoped records built from them.

use serde::{Deserialize, Serialize};

use crate::claim::ClaimReceipt;
use crate::clock::Timestamp;
use crate::model::{StepId, StoryId};

/// Emitted by the engine after a committed claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StepClaimed {
        receipt: ClaimReceipt,
        story_title: String,
        step_name: String,
        reward_enabled: bool,
    },
    /// Every step of the story is now in the claimed set.
    StoryCompleted {
        story_id: StoryId,
        story_title: String,
        total_distance_meters: f64,
        completed_at: Timestamp,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(default)]
    pub stories_created: u32,
    #[serde(default)]
    pub stories_completed: u32,
    #[serde(default)]
    pub steps_completed: u32,
    /// Meters.
    #[serde(default)]
    pub total_distance_traveled: f64,
    #[serde(default)]
    pub rewards_earned: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub user_id: String,
    pub code: String,
    pub story_id: StoryId,
    pub step_id: StepId,
    pub story_title: String,
    pub step_name: String,
    pub earned_at: Timestamp,
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStoryRecord {
    pub user_id: String,
    pub story_id: StoryId,
    pub title: String,
    pub completed_at: Timestamp,
    #[serde(default)]
    pub total_distance: f64,
}

/// Profile record persisted under the current-user key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub stats: UserStats,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub last_active: Option<Timestamp>,
}

impl UserProfile {
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            stats: UserStats::default(),
            created_at: Some(now),
            last_active: Some(now),
        }
    }
}

/// Applies engine events to one user's profile, reward list and completed
/// stories.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLedger {
    pub profile: UserProfile,
    pub rewards: Vec<RewardRecord>,
    pub completed: Vec<CompletedStoryRecord>,
}

impl ProgressLedger {
    #[must_use]
    pub const fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            rewards: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Rebuild from persisted records, keeping only this user's entries.
    #[must_use]
    pub fn from_records(
        profile: UserProfile,
        rewards: Vec<RewardRecord>,
        completed: Vec<CompletedStoryRecord>,
    ) -> Self {
        let user = profile.id.clone();
        Self {
            rewards: rewards.into_iter().filter(|r| r.user_id == user).collect(),
            completed: completed.into_iter().filter(|c| c.user_id == user).collect(),
            profile,
        }
    }

    #[must_use]
    pub const fn stats(&self) -> &UserStats {
        &self.profile.stats
    }

    pub fn record_story_created(&mut self) {
        self.profile.stats.stories_created += 1;
    }

    pub fn record(&mut self, event: &EngineEvent) {
        let user_id = self.profile.id.clone();
        let stats = &mut self.profile.stats;
        match event {
            EngineEvent::StepClaimed {
                receipt,
                story_title,
                step_name,
                reward_enabled,
            } => {
                stats.steps_completed += 1;
                if *reward_enabled {
                    stats.rewards_earned += 1;
                    self.rewards.push(RewardRecord {
                        user_id,
                        code: receipt.reward_code.clone(),
                        story_id: receipt.story_id.clone(),
                        step_id: receipt.step_id.clone(),
                        story_title: story_title.clone(),
                        step_name: step_name.clone(),
                        earned_at: receipt.claimed_at,
                        expires_at: None,
                    });
                }
                self.profile.last_active = Some(receipt.claimed_at);
            }
            EngineEvent::StoryCompleted {
                story_id,
                story_title,
                total_distance_meters,
                completed_at,
            } => {
                if self.completed.iter().any(|c| &c.story_id == story_id) {
                    return;
                }
                stats.stories_completed += 1;
                stats.total_distance_traveled += total_distance_meters;
                self.completed.push(CompletedStoryRecord {
                    user_id,
                    story_id: story_id.clone(),
                    title: story_title.clone(),
                    completed_at: *completed_at,
                    total_distance: *total_distance_meters,
                });
            }
        }
    }

    #[must_use]
    pub fn achievements(&self) -> Vec<Achievement> {
        achievements(self.stats())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    StoriesCreated,
    StoriesCompleted,
    DistanceMeters,
    StepsCompleted,
}

/// An unlocked badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

struct Unlock {
    metric: Metric,
    threshold: u32,
    achievement: Achievement,
}

const fn unlock(
    metric: Metric,
    threshold: u32,
    id: &'static str,
    name: &'static str,
    description: &'static str,
) -> Unlock {
    Unlock {
        metric,
        threshold,
        achievement: Achievement {
            id,
            name,
            description,
        },
    }
}

const CATALOG: [Unlock; 11] = [
    unlock(Metric::StoriesCreated, 1, "first_story", "First Story", "Created your first story"),
    unlock(Metric::StoriesCreated, 5, "story_creator", "Story Creator", "Created 5 stories"),
    unlock(Metric::StoriesCreated, 10, "story_master", "Story Master", "Created 10+ stories"),
    unlock(
        Metric::StoriesCompleted,
        1,
        "first_completion",
        "First Completion",
        "Completed your first story",
    ),
    unlock(Metric::StoriesCompleted, 5, "explorer", "Explorer", "Completed 5 stories"),
    unlock(Metric::StoriesCompleted, 10, "adventurer", "Adventurer", "Completed 10+ stories"),
    unlock(Metric::DistanceMeters, 1_000, "walker", "Walker", "Traveled 1km+"),
    unlock(Metric::DistanceMeters, 5_000, "hiker", "Hiker", "Traveled 5km+"),
    unlock(Metric::DistanceMeters, 10_000, "trekker", "Trekker", "Traveled 10km+"),
    unlock(Metric::StepsCompleted, 10, "step_starter", "Step Starter", "Completed 10 steps"),
    unlock(Metric::StepsCompleted, 50, "step_master", "Step Master", "Completed 50+ steps"),
];

/// Catalog entries whose thresholds `stats` meets, in catalog order.
#[must_use]
pub fn achievements(stats: &UserStats) -> Vec<Achievement> {
    CATALOG
        .iter()
        .filter(|entry| {
            let threshold = entry.threshold;
            match entry.metric {
                Metric::StoriesCreated => stats.stories_created >= threshold,
                Metric::StoriesCompleted => stats.stories_completed >= threshold,
                Metric::DistanceMeters => stats.total_distance_traveled >= f64::from(threshold),
                Metric::StepsCompleted => stats.steps_completed >= threshold,
            }
        })
        .map(|entry| entry.achievement)
        .collect()
}
