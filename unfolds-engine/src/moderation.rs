//! Story status lifecycle and the review queue.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::authoring::validate_for_publish;
use crate::clock::Timestamp;
use crate::constants::{
    PRIORITY_FRESH_HOURS, PRIORITY_HIGH_MIN, PRIORITY_MEDIUM_MIN, PRIORITY_PUBLIC_BONUS,
    PRIORITY_RECENT_HOURS,
};
use crate::error::ValidationError;
use crate::model::{Availability, StoryId, Story, StoryStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    Adjust,
}

impl ReviewAction {
    const fn outcome(self) -> StoryStatus {
        match self {
            Self::Approve => StoryStatus::Published,
            Self::Reject => StoryStatus::Rejected,
            Self::Adjust => StoryStatus::Pending,
        }
    }
}

impl FromStr for ReviewAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "adjust" => Ok(Self::Adjust),
            other => Err(ValidationError::UnrecognizedDocument {
                reason: format!("unknown review action {other:?}"),
            }),
        }
    }
}

/// One moderator decision on a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    pub story_id: StoryId,
    pub action: ReviewAction,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub adjustments: Vec<String>,
    pub reviewer_id: String,
    pub reviewed_at: Timestamp,
}

/// Input for [`review`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    pub notes: String,
    pub adjustments: Vec<String>,
    pub reviewer_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModerationRecord {
    #[serde(default)]
    pub submitted_at: Option<Timestamp>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub review_history: Vec<ReviewRecord>,
}

impl ModerationRecord {
    #[must_use]
    pub fn last_review(&self) -> Option<&ReviewRecord> {
        self.review_history.last()
    }
}

/// Queue tabs in the moderation view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationFilter {
    #[default]
    All,
    Pending,
    Approved,
    Rejected,
}

impl ModerationFilter {
    #[must_use]
    pub const fn matches(self, status: StoryStatus) -> bool {
        match self {
            Self::All => true,
            Self::Pending => matches!(status, StoryStatus::Pending),
            Self::Approved => matches!(status, StoryStatus::Published),
            Self::Rejected => matches!(status, StoryStatus::Rejected),
        }
    }
}

impl FromStr for ModerationFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "pending" => Ok(Self::Pending),
            "approved" | "published" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ValidationError::UnrecognizedDocument {
                reason: format!("unknown moderation filter {other:?}"),
            }),
        }
    }
}

fn transition_error(from: StoryStatus, to: StoryStatus) -> ValidationError {
    ValidationError::StatusTransition { from, to }
}

/// Score a story for the review queue.
#[must_use]
pub fn moderation_priority(story: &Story, now: Timestamp) -> Priority {
    let mut score = 0_u32;
    if story.availability == Availability::Public {
        score += PRIORITY_PUBLIC_BONUS;
    }
    score += match story.steps().len() {
        n if n > 5 => 2,
        n if n > 2 => 1,
        _ => 0,
    };
    let submitted = story
        .moderation
        .as_ref()
        .and_then(|record| record.submitted_at)
        .or(story.created_at);
    if let Some(submitted) = submitted {
        let hours = (now - submitted).num_minutes() / 60;
        if hours < PRIORITY_FRESH_HOURS {
            score += 2;
        } else if hours < PRIORITY_RECENT_HOURS {
            score += 1;
        }
    }
    if score >= PRIORITY_HIGH_MIN {
        Priority::High
    } else if score >= PRIORITY_MEDIUM_MIN {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Submit a draft or rejected story. Public stories wait for review;
/// private ones publish immediately.
///
/// # Errors
///
/// Returns [`ValidationError::StatusTransition`] from any other status, or
/// [`ValidationError::NotPublishable`] when the story fails the publish
/// checks. The story is untouched on error.
pub fn submit(story: &mut Story, now: Timestamp) -> Result<StoryStatus, ValidationError> {
    let target = match story.availability {
        Availability::Public => StoryStatus::Pending,
        Availability::Private => StoryStatus::Published,
    };
    if !matches!(story.status, StoryStatus::Draft | StoryStatus::Rejected) {
        return Err(transition_error(story.status, target));
    }
    validate_for_publish(story)
        .map_err(|report| ValidationError::NotPublishable(Box::new(report)))?;
    story.status = target;
    let record = story.moderation.get_or_insert_with(ModerationRecord::default);
    record.submitted_at = Some(now);
    let priority = moderation_priority(story, now);
    if let Some(record) = story.moderation.as_mut() {
        record.priority = priority;
    }
    log::info!("story {} submitted as {}", story.id(), target);
    Ok(target)
}

/// Apply a moderator decision to a pending story and append it to history.
///
/// # Errors
///
/// Returns [`ValidationError::StatusTransition`] unless the story is pending.
pub fn review(
    story: &mut Story,
    request: ReviewRequest,
    at: Timestamp,
) -> Result<ReviewRecord, ValidationError> {
    let target = request.action.outcome();
    if story.status != StoryStatus::Pending {
        return Err(transition_error(story.status, target));
    }
    let story_id = story.id().clone();
    let record = story.moderation.get_or_insert_with(ModerationRecord::default);
    let review = ReviewRecord {
        id: format!(
            "review_{}_{}",
            at.timestamp_millis(),
            record.review_history.len() + 1
        ),
        story_id,
        action: request.action,
        notes: request.notes,
        adjustments: request.adjustments,
        reviewer_id: request.reviewer_id,
        reviewed_at: at,
    };
    record.review_history.push(review.clone());
    story.status = target;
    log::info!("story {} reviewed: {:?}", story.id(), review.action);
    Ok(review)
}

/// Retire a published story from discovery.
///
/// # Errors
///
/// Returns [`ValidationError::StatusTransition`] unless the story is published.
pub fn archive(story: &mut Story) -> Result<(), ValidationError> {
    if story.status != StoryStatus::Published {
        return Err(transition_error(story.status, StoryStatus::Archived));
    }
    story.status = StoryStatus::Archived;
    Ok(())
}

/// Stories matching `filter`, highest priority first, oldest submission first
/// within a priority.
#[must_use]
pub fn moderation_queue<'a>(
    stories: &'a [Story],
    filter: ModerationFilter,
    now: Timestamp,
) -> Vec<&'a Story> {
    let mut queue: Vec<(Priority, Option<Timestamp>, &Story)> = stories
        .iter()
        .filter(|story| filter.matches(story.status))
        .map(|story| {
            let submitted = story
                .moderation
                .as_ref()
                .and_then(|record| record.submitted_at)
                .or(story.created_at);
            (moderation_priority(story, now), submitted, story)
        })
        .collect();
    queue.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    queue.into_iter().map(|(_, _, story)| story).collect()
}
