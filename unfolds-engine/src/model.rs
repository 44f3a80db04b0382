//! Canonical in-memory records shared by every engine component.
//!
//! Both authored schemas normalize into these types; nothing downstream of
//! [`crate::schema`] needs to know which shape a story arrived in.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::clock::{Timestamp, format_timestamp};
use crate::error::ValidationError;
use crate::geo::Coordinate;
use crate::moderation::ModerationRecord;
use crate::numbers::usize_to_u32;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a step, unique within its story.
    StepId
);
string_id!(
    /// Identifier of a story.
    StoryId
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    #[default]
    Draft,
    Pending,
    #[serde(alias = "approved")]
    Published,
    Rejected,
    Archived,
}

impl StoryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
    Epic,
}

impl Difficulty {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Epic => "epic",
        }
    }
}

/// Summary figures derived from a story's steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetadata {
    pub difficulty: Difficulty,
    pub estimated_duration_minutes: u32,
    pub total_distance_meters: f64,
    pub total_steps: u32,
}

/// Which on-disk shape a story was imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Legacy,
    Unfold,
}

/// An enabled claiming window; `starts_at < due_at` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimingWindow {
    starts_at: Timestamp,
    due_at: Timestamp,
}

impl ClaimingWindow {
    /// # Errors
    ///
    /// Returns [`ValidationError::WindowOrder`] unless `starts_at < due_at`.
    pub fn new(starts_at: Timestamp, due_at: Timestamp) -> Result<Self, ValidationError> {
        let window = Self { starts_at, due_at };
        window.check_order()?;
        Ok(window)
    }

    #[must_use]
    pub const fn starts_at(&self) -> Timestamp {
        self.starts_at
    }

    #[must_use]
    pub const fn due_at(&self) -> Timestamp {
        self.due_at
    }

    /// Inclusive at both ends.
    #[must_use]
    pub fn contains(&self, as_of: Timestamp) -> bool {
        self.starts_at <= as_of && as_of <= self.due_at
    }

    pub(crate) fn check_order(&self) -> Result<(), ValidationError> {
        if self.starts_at < self.due_at {
            Ok(())
        } else {
            Err(ValidationError::WindowOrder {
                starts_at: format_timestamp(self.starts_at),
                due_at: format_timestamp(self.due_at),
            })
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub enabled: bool,
    pub limited: bool,
    pub quantity: Option<u32>,
    pub claimed_count: u32,
    /// Fixed code handed to every claimant.
    pub code: Option<String>,
    /// Prefix for generated codes when no fixed code exists.
    pub code_prefix: Option<String>,
}

impl Reward {
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn limited(quantity: u32) -> Self {
        Self {
            enabled: true,
            limited: true,
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_claimed(mut self, claimed_count: u32) -> Self {
        self.claimed_count = claimed_count;
        self
    }

    /// Remaining issuances when limited, `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        if self.limited {
            self.quantity
                .map(|quantity| quantity.saturating_sub(self.claimed_count))
        } else {
            None
        }
    }

    /// A fixed code counts only when it is non-blank.
    #[must_use]
    pub fn fixed_code(&self) -> Option<&str> {
        self.code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    /// # Errors
    ///
    /// Fails when a limited reward lacks a positive quantity or its claimed
    /// count already exceeds that quantity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.limited {
            return Ok(());
        }
        match self.quantity {
            None | Some(0) => Err(ValidationError::MissingQuantity),
            Some(quantity) if self.claimed_count > quantity => {
                Err(ValidationError::ClaimedExceedsQuantity {
                    claimed: self.claimed_count,
                    quantity,
                })
            }
            Some(_) => Ok(()),
        }
    }
}

/// Authored fields of a step before it is attached to a story.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDraft {
    /// Explicit id; derived from the story when absent.
    pub id: Option<StepId>,
    pub name: String,
    pub description: String,
    pub coordinates: Coordinate,
    pub claiming_radius_meters: f64,
    pub claiming_window: Option<ClaimingWindow>,
    pub reward: Reward,
}

impl StepDraft {
    #[must_use]
    pub fn new(name: impl Into<String>, coordinates: Coordinate, radius_meters: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            coordinates,
            claiming_radius_meters: radius_meters,
            claiming_window: None,
            reward: Reward::default(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: ClaimingWindow) -> Self {
        self.claiming_window = Some(window);
        self
    }

    #[must_use]
    pub fn with_reward(mut self, reward: Reward) -> Self {
        self.reward = reward;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<StepId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A single geofenced point of interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    id: StepId,
    story_id: StoryId,
    pub story_name: String,
    /// 1-based position within the story.
    pub order: u32,
    pub name: String,
    pub description: String,
    pub coordinates: Coordinate,
    pub claiming_radius_meters: f64,
    pub claiming_window: Option<ClaimingWindow>,
    pub reward: Reward,
    /// Recomputed on every location update; never persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_from_user: Option<f64>,
}

impl Step {
    #[must_use]
    pub fn id(&self) -> &StepId {
        &self.id
    }

    #[must_use]
    pub fn story_id(&self) -> &StoryId {
        &self.story_id
    }

    /// Re-check every structural invariant of the step.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.coordinates.validated()?;
        check_radius(self.claiming_radius_meters)?;
        if let Some(window) = &self.claiming_window {
            window.check_order()?;
        }
        self.reward.validate()
    }
}

fn check_radius(radius: f64) -> Result<(), ValidationError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidRadius { value: radius })
    }
}

/// An ordered sequence of steps with shared metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Story {
    id: StoryId,
    pub title: String,
    pub description: String,
    pub availability: Availability,
    pub status: StoryStatus,
    pub metadata: AggregatedMetadata,
    pub author_id: Option<String>,
    pub created_at: Option<Timestamp>,
    pub moderation: Option<ModerationRecord>,
    /// Free-text completion reward carried by legacy quests.
    pub reward_note: Option<String>,
    /// Document id the story was imported under, when it differs from `id`.
    pub source_id: Option<String>,
    pub origin: SchemaKind,
    steps: Vec<Step>,
}

impl Story {
    #[must_use]
    pub fn new(id: impl Into<StoryId>, title: impl Into<String>, origin: SchemaKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            availability: Availability::Public,
            status: StoryStatus::Draft,
            metadata: AggregatedMetadata::default(),
            author_id: None,
            created_at: None,
            moderation: None,
            reward_note: None,
            source_id: None,
            origin,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &StoryId {
        &self.id
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Mutable access to steps; identity fields stay read-only.
    pub fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id.as_str() == id)
    }

    /// Validate and append a step, assigning its identity.
    ///
    /// # Errors
    ///
    /// Fails when the draft violates a step invariant or its id collides with
    /// a step already in this story.
    pub fn push_step(&mut self, draft: StepDraft) -> Result<&Step, ValidationError> {
        let order = usize_to_u32(self.steps.len() + 1);
        let id = draft
            .id
            .clone()
            .unwrap_or_else(|| self.derive_step_id(order));
        if self.steps.iter().any(|step| step.id == id) {
            return Err(ValidationError::DuplicateStep {
                id,
                story: self.title.clone(),
            });
        }
        let step = Step {
            id,
            story_id: self.id.clone(),
            story_name: self.title.clone(),
            order,
            name: draft.name,
            description: draft.description,
            coordinates: draft.coordinates,
            claiming_radius_meters: draft.claiming_radius_meters,
            claiming_window: draft.claiming_window,
            reward: draft.reward,
            distance_from_user: None,
        };
        step.validate()?;
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    fn derive_step_id(&self, order: u32) -> StepId {
        match self.origin {
            SchemaKind::Legacy => StepId::new(format!("{}-{order}", slugify(&self.title))),
            SchemaKind::Unfold => StepId::new(format!(
                "st_{}",
                opaque_token(&[self.id.as_str(), &order.to_string()])
            )),
        }
    }
}

/// Collapse whitespace runs to `-` and lowercase, matching legacy step ids.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_space = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
        } else {
            slug.extend(ch.to_lowercase());
            in_space = false;
        }
    }
    slug
}

/// Deterministic nine-character base-36 token for ids missing from documents.
pub(crate) fn opaque_token(parts: &[&str]) -> String {
    let mut hasher = XxHash64::with_seed(0x5EED_0F0D);
    for part in parts {
        hasher.write(part.as_bytes());
        hasher.write_u8(0x1F);
    }
    let mut token = to_base36(hasher.finish());
    token.truncate(9);
    token
}

pub(crate) fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
