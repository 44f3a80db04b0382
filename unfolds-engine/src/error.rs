//! Error kinds surfaced by the engine.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

use crate::model::{StepId, StoryStatus};

/// Malformed or inconsistent quest data.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be a finite number (got {value})")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("missing required field `{field}`")]
    MissingField { field: String },
    #[error("{field} must not be empty")]
    EmptyField { field: String },
    #[error("claiming radius must be positive (got {value})")]
    InvalidRadius { value: f64 },
    #[error("could not parse {field} as a timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("claiming window start {starts_at} must be before due {due_at}")]
    WindowOrder { starts_at: String, due_at: String },
    #[error("limited reward requires a quantity of at least 1")]
    MissingQuantity,
    #[error("claimed count {claimed} exceeds reward quantity {quantity}")]
    ClaimedExceedsQuantity { claimed: u32, quantity: u32 },
    #[error("step id {id} is already used by story {story}")]
    DuplicateStep { id: StepId, story: String },
    #[error("story has no steps")]
    NoSteps,
    #[error("cannot move story from {from} to {to}")]
    StatusTransition { from: StoryStatus, to: StoryStatus },
    #[error("unrecognized story document: {reason}")]
    UnrecognizedDocument { reason: String },
    #[error("story is not ready to publish: {0}")]
    NotPublishable(Box<ValidationReport>),
}

impl ValidationError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn empty(field: impl Into<String>) -> Self {
        Self::EmptyField {
            field: field.into(),
        }
    }
}

/// Every issue found by a publish-time validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: SmallVec<[ValidationError; 4]>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn push(&mut self, issue: ValidationError) {
        self.issues.push(issue);
    }

    /// Convert into a `Result`, failing when any issue was recorded.
    ///
    /// # Errors
    ///
    /// Returns the report itself when it contains at least one issue.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation issue(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n- {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

/// The specific precondition a claim attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimFailure {
    AlreadyClaimed,
    NotAvailable,
    TooFar,
}

impl ClaimFailure {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::AlreadyClaimed => "already_claimed",
            Self::NotAvailable => "not_available",
            Self::TooFar => "too_far",
        }
    }
}

impl fmt::Display for ClaimFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AlreadyClaimed => "already claimed",
            Self::NotAvailable => "not available",
            Self::TooFar => "too far away",
        };
        f.write_str(text)
    }
}

/// A rejected claim; the engine performed no mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot claim step {step_id}: {reason}")]
pub struct ClaimError {
    pub step_id: StepId,
    pub reason: ClaimFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Step,
    Story,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Step => "step",
            Self::Story => "story",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} id {id}")]
pub struct NotFoundError {
    pub kind: EntityKind,
    pub id: String,
}

impl NotFoundError {
    pub(crate) fn step(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Step,
            id: id.into(),
        }
    }

    pub(crate) fn story(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Story,
            id: id.into(),
        }
    }
}

/// Storage read/write failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage error on {key}: {message}")]
    Storage { key: String, message: String },
    #[error("serialization error on {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub fn storage(key: &str, err: impl fmt::Display) -> Self {
        Self::Storage {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

/// Top-level error returned by [`crate::engine::QuestEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl EngineError {
    /// The claim precondition that failed, if this is a claim rejection.
    #[must_use]
    pub const fn claim_failure(&self) -> Option<ClaimFailure> {
        match self {
            Self::Claim(err) => Some(err.reason),
            _ => None,
        }
    }
}
