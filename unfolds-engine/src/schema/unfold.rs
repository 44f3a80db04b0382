//! The newer unfold/story document shape (`title`, `geo`, `time_window`,
//! `step_reward.remaining`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::authoring::refresh_metadata;
use crate::clock::{format_timestamp, parse_optional};
use crate::constants::DEFAULT_CLAIM_RADIUS_METERS;
use crate::error::ValidationError;
use crate::geo::Coordinate;
use crate::model::{
    Availability, ClaimingWindow, Difficulty, Reward, SchemaKind, StepDraft, StepId, Story,
    StoryStatus, opaque_token,
};
use crate::moderation::ModerationRecord;
use crate::numbers::{round_f64_to_u64, usize_to_u32};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnfoldStory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StoryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_metadata: Option<UnfoldMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderation: Option<ModerationRecord>,
    #[serde(default)]
    pub steps: Vec<UnfoldStep>,
    /// Fields the engine does not interpret (`access_policy`, `story_reward`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnfoldMetadata {
    #[serde(default)]
    pub estimated_duration: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub completion_count: u32,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_distance: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnfoldGeo {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnfoldStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unfold_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_order: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub geo: UnfoldGeo,
    #[serde(default)]
    pub claim_radius: Option<f64>,
    #[serde(default)]
    pub time_window: UnfoldWindow,
    #[serde(default)]
    pub step_reward: UnfoldReward,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfoldWindow {
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfoldReward {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub limited: bool,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub remaining: Option<u32>,
    #[serde(default)]
    pub coupon_prefix: Option<String>,
    #[serde(default)]
    pub expiration_hours: Option<u32>,
    /// Legacy spelling accepted on import only.
    #[serde(default, alias = "claimedCount", skip_serializing)]
    pub claimed_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

fn window_from_unfold(window: &UnfoldWindow) -> Result<Option<ClaimingWindow>, ValidationError> {
    let starts_at = parse_optional("time_window.start_at", window.start_at.as_deref())?;
    let due_at = parse_optional("time_window.due_at", window.due_at.as_deref())?;
    match (starts_at, due_at) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ValidationError::missing("time_window.due_at")),
        (None, Some(_)) => Err(ValidationError::missing("time_window.start_at")),
        (Some(start), Some(due)) => ClaimingWindow::new(start, due).map(Some),
    }
}

fn reward_from_unfold(reward: &UnfoldReward) -> Reward {
    let claimed_count = reward.claimed_count.unwrap_or_else(|| {
        match (reward.limited, reward.quantity, reward.remaining) {
            (true, Some(quantity), Some(remaining)) => quantity.saturating_sub(remaining),
            _ => 0,
        }
    });
    Reward {
        enabled: reward.enabled,
        limited: reward.limited,
        quantity: reward.quantity,
        claimed_count,
        code: reward.code.clone(),
        code_prefix: reward
            .coupon_prefix
            .clone()
            .filter(|prefix| !prefix.trim().is_empty()),
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Normalize a newer-schema story into a canonical [`Story`].
///
/// Steps are ordered by `step_order` when present, document order otherwise.
///
/// # Errors
///
/// Fails on invalid coordinates or radius, a half-specified or inverted time
/// window, inconsistent reward counts, or duplicate step ids.
pub fn from_unfold(doc: &UnfoldStory) -> Result<Story, ValidationError> {
    let id = non_blank(doc.id.as_ref()).map_or_else(
        || format!("uf_{}", opaque_token(&[doc.title.as_str()])),
        ToString::to_string,
    );
    let mut story = Story::new(id, doc.title.clone(), SchemaKind::Unfold);
    story.description.clone_from(&doc.description);
    story.availability = doc.availability;
    story.status = doc.status.unwrap_or_default();
    story.author_id.clone_from(&doc.author_id);
    story.created_at = parse_optional("created_at", doc.created_at.as_deref())?;
    story.moderation.clone_from(&doc.moderation);

    let mut ordered: Vec<(u32, &UnfoldStep)> = doc
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| (step.step_order.unwrap_or(usize_to_u32(index + 1)), step))
        .collect();
    ordered.sort_by_key(|(order, _)| *order);

    for (_, raw) in ordered {
        let coordinates = Coordinate::new(raw.geo.lat, raw.geo.lng)?;
        let radius = raw.claim_radius.unwrap_or(DEFAULT_CLAIM_RADIUS_METERS);
        let mut draft = StepDraft::new(raw.name.clone(), coordinates, radius)
            .with_description(raw.description.clone())
            .with_reward(reward_from_unfold(&raw.step_reward));
        draft.id = non_blank(raw.id.as_ref()).map(StepId::from);
        draft.claiming_window = window_from_unfold(&raw.time_window)?;
        story.push_step(draft)?;
    }
    refresh_metadata(&mut story);
    Ok(story)
}

/// Export a story in the newer shape, deriving `remaining` from the claimed
/// count.
#[must_use]
pub fn to_unfold(story: &Story) -> UnfoldStory {
    let steps = story
        .steps()
        .iter()
        .map(|step| {
            let reward = &step.reward;
            UnfoldStep {
                id: Some(step.id().to_string()),
                unfold_id: Some(story.id().to_string()),
                step_order: Some(step.order),
                name: step.name.clone(),
                description: step.description.clone(),
                geo: UnfoldGeo {
                    lat: step.coordinates.lat,
                    lng: step.coordinates.lng,
                },
                claim_radius: Some(step.claiming_radius_meters),
                time_window: step
                    .claiming_window
                    .map_or_else(UnfoldWindow::default, |w| UnfoldWindow {
                        start_at: Some(format_timestamp(w.starts_at())),
                        due_at: Some(format_timestamp(w.due_at())),
                    }),
                step_reward: UnfoldReward {
                    enabled: reward.enabled,
                    limited: reward.limited,
                    quantity: reward.quantity,
                    remaining: reward.remaining(),
                    coupon_prefix: reward.code_prefix.clone(),
                    expiration_hours: None,
                    claimed_count: None,
                    code: reward.code.clone(),
                },
                created_at: None,
            }
        })
        .collect();
    let meta = &story.metadata;
    UnfoldStory {
        id: Some(story.id().to_string()),
        title: story.title.clone(),
        description: story.description.clone(),
        availability: story.availability,
        status: Some(story.status),
        author_id: story.author_id.clone(),
        created_at: story.created_at.map(format_timestamp),
        aggregated_metadata: Some(UnfoldMetadata {
            estimated_duration: meta.estimated_duration_minutes,
            difficulty: meta.difficulty,
            total_steps: meta.total_steps,
            completion_count: 0,
            rating: 0.0,
            total_distance: round_f64_to_u64(meta.total_distance_meters),
        }),
        moderation: story.moderation.clone(),
        steps,
        extra: Map::new(),
    }
}
