//! The original quest/step document shape (`story` + `steps`, `x`/`y`
//! coordinates, `claimingWindow`, `reward.claimedCount`).

use serde::{Deserialize, Serialize};

use crate::authoring::refresh_metadata;
use crate::clock::{Timestamp, format_timestamp, parse_optional};
use crate::constants::LEGACY_DATABASE_VERSION;
use crate::error::ValidationError;
use crate::geo::Coordinate;
use crate::model::{
    Availability, ClaimingWindow, Reward, SchemaKind, StepDraft, Story, StoryStatus, slugify,
};
use crate::moderation::ModerationRecord;

/// A quest record. `status` and `moderation` are written only once a story
/// leaves the published state or gains review history; older readers ignore
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyQuest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub story: LegacyStoryHeader,
    #[serde(default)]
    pub steps: Vec<LegacyStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StoryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderation: Option<ModerationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyStoryHeader {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
}

/// `x` is latitude and `y` is longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegacyCoordinates {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub coordinates: LegacyCoordinates,
    pub claiming_radius: f64,
    #[serde(default)]
    pub claiming_window: LegacyWindow,
    #[serde(default)]
    pub reward: LegacyReward,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyWindow {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyReward {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub limited: bool,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub claimed_count: u32,
}

/// The `questDatabase` storage record and `database.json` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyDatabase {
    #[serde(default)]
    pub quests: Vec<LegacyQuest>,
    #[serde(default)]
    pub metadata: LegacyDatabaseMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyDatabaseMetadata {
    pub version: String,
    #[serde(default)]
    pub total_quests: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Default for LegacyDatabaseMetadata {
    fn default() -> Self {
        Self {
            version: LEGACY_DATABASE_VERSION.to_string(),
            total_quests: 0,
            last_updated: None,
        }
    }
}

impl LegacyDatabase {
    #[must_use]
    pub fn from_quests(quests: Vec<LegacyQuest>, updated_at: Timestamp) -> Self {
        Self {
            metadata: LegacyDatabaseMetadata {
                version: LEGACY_DATABASE_VERSION.to_string(),
                total_quests: quests.len(),
                last_updated: Some(format_timestamp(updated_at)),
            },
            quests,
        }
    }
}

fn window_from_legacy(window: &LegacyWindow) -> Result<Option<ClaimingWindow>, ValidationError> {
    if !window.enabled {
        return Ok(None);
    }
    let starts_at = parse_optional("claimingWindow.startDate", window.start_date.as_deref())?
        .ok_or_else(|| ValidationError::missing("claimingWindow.startDate"))?;
    let due_at = parse_optional("claimingWindow.dueDate", window.due_date.as_deref())?
        .ok_or_else(|| ValidationError::missing("claimingWindow.dueDate"))?;
    ClaimingWindow::new(starts_at, due_at).map(Some)
}

fn reward_from_legacy(reward: &LegacyReward) -> Reward {
    Reward {
        enabled: reward.enabled,
        limited: reward.limited,
        quantity: reward.quantity,
        claimed_count: reward.claimed_count,
        code: reward.code.clone(),
        code_prefix: None,
    }
}

/// Normalize a legacy quest into a canonical [`Story`].
///
/// Legacy quests are public and count as published unless the record carries
/// its own `status`.
///
/// # Errors
///
/// Fails on a blank story name, invalid coordinates or radius, a malformed
/// enabled window, or inconsistent reward counts.
pub fn from_legacy(quest: &LegacyQuest) -> Result<Story, ValidationError> {
    let name = quest.story.name.trim();
    if name.is_empty() {
        return Err(ValidationError::empty("story.name"));
    }
    let mut story = Story::new(
        format!("legacy_{}", slugify(&quest.story.name)),
        quest.story.name.clone(),
        SchemaKind::Legacy,
    );
    story.description.clone_from(&quest.story.description);
    story.availability = Availability::Public;
    story.status = quest.status.unwrap_or(StoryStatus::Published);
    story.moderation.clone_from(&quest.moderation);
    story.reward_note = quest
        .story
        .reward
        .clone()
        .filter(|note| !note.trim().is_empty());
    story.source_id = quest.id.clone().filter(|id| !id.trim().is_empty());
    story.created_at = parse_optional("createdAt", quest.created_at.as_deref())?;
    for raw in &quest.steps {
        let coordinates = Coordinate::new(raw.coordinates.x, raw.coordinates.y)?;
        let mut draft = StepDraft::new(raw.name.clone(), coordinates, raw.claiming_radius)
            .with_description(raw.description.clone())
            .with_reward(reward_from_legacy(&raw.reward));
        draft.claiming_window = window_from_legacy(&raw.claiming_window)?;
        story.push_step(draft)?;
    }
    refresh_metadata(&mut story);
    Ok(story)
}

/// Export a story in the legacy shape. `claimedCount`, coordinates and radius
/// are copied without conversion.
#[must_use]
pub fn to_legacy(story: &Story) -> LegacyQuest {
    let steps = story
        .steps()
        .iter()
        .map(|step| LegacyStep {
            id: None,
            name: step.name.clone(),
            description: step.description.clone(),
            coordinates: LegacyCoordinates {
                x: step.coordinates.lat,
                y: step.coordinates.lng,
            },
            claiming_radius: step.claiming_radius_meters,
            claiming_window: step.claiming_window.map_or_else(LegacyWindow::default, |w| {
                LegacyWindow {
                    enabled: true,
                    start_date: Some(format_timestamp(w.starts_at())),
                    due_date: Some(format_timestamp(w.due_at())),
                }
            }),
            reward: LegacyReward {
                enabled: step.reward.enabled,
                code: step.reward.code.clone(),
                limited: step.reward.limited,
                quantity: step.reward.quantity,
                claimed_count: step.reward.claimed_count,
            },
        })
        .collect();
    LegacyQuest {
        id: story.source_id.clone(),
        story: LegacyStoryHeader {
            name: story.title.clone(),
            description: story.description.clone(),
            reward: story.reward_note.clone(),
        },
        steps,
        created_at: story.created_at.map(format_timestamp),
        status: (story.status != StoryStatus::Published).then_some(story.status),
        moderation: story.moderation.clone(),
    }
}
