//! Claim eligibility, the claim transaction and the per-step state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::availability::{WindowPhase, has_reward_capacity, is_within_window, window_phase};
use crate::clock::Timestamp;
use crate::error::{ClaimError, ClaimFailure};
use crate::geo::{Coordinate, distance_meters};
use crate::model::{Step, StepId, StoryId};
use crate::reward_code::RewardCodeIssuer;

/// Step ids the user has claimed. Persisted as a JSON array of strings.
///
/// Entries are only ever added by [`claim`] and only removed in bulk by
/// [`clear_all_claims`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimedSet(BTreeSet<StepId>);

impl ClaimedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepId> {
        self.0.iter()
    }

    fn insert(&mut self, id: StepId) -> bool {
        self.0.insert(id)
    }
}

impl FromIterator<StepId> for ClaimedSet {
    fn from_iter<I: IntoIterator<Item = StepId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `true` when `user` is within the step's claiming radius, inclusive.
#[must_use]
pub fn is_user_in_radius(user: Coordinate, step: &Step) -> bool {
    distance_meters(user, step.coordinates) <= step.claiming_radius_meters
}

/// Label shown on a step's claim control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Claimed,
    Available,
    TooFar,
    Unavailable,
}

impl StepStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Claimed => "Claimed",
            Self::Available => "Claim Reward",
            Self::TooFar => "Too Far Away",
            Self::Unavailable => "Not Available",
        }
    }
}

/// Every precondition of a claim, evaluated at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimEligibility {
    pub step_id: StepId,
    pub already_claimed: bool,
    pub within_window: bool,
    pub has_capacity: bool,
    pub in_radius: bool,
    /// `None` when no user location is known.
    pub distance_meters: Option<f64>,
}

impl ClaimEligibility {
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.within_window && self.has_capacity
    }

    #[must_use]
    pub const fn can_claim(&self) -> bool {
        self.failure().is_none()
    }

    /// First failed precondition, checked as already-claimed, then
    /// availability, then proximity.
    #[must_use]
    pub const fn failure(&self) -> Option<ClaimFailure> {
        if self.already_claimed {
            Some(ClaimFailure::AlreadyClaimed)
        } else if !self.is_available() {
            Some(ClaimFailure::NotAvailable)
        } else if !self.in_radius {
            Some(ClaimFailure::TooFar)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn status(&self) -> StepStatus {
        match self.failure() {
            None => StepStatus::Available,
            Some(ClaimFailure::AlreadyClaimed) => StepStatus::Claimed,
            Some(ClaimFailure::NotAvailable) => StepStatus::Unavailable,
            Some(ClaimFailure::TooFar) => StepStatus::TooFar,
        }
    }
}

#[must_use]
pub fn evaluate(
    step: &Step,
    user: Option<Coordinate>,
    claimed: &ClaimedSet,
    as_of: Timestamp,
) -> ClaimEligibility {
    let distance = user.map(|at| distance_meters(at, step.coordinates));
    ClaimEligibility {
        step_id: step.id().clone(),
        already_claimed: claimed.contains(step.id().as_str()),
        within_window: is_within_window(step, as_of),
        has_capacity: has_reward_capacity(step),
        in_radius: distance.is_some_and(|d| d <= step.claiming_radius_meters),
        distance_meters: distance,
    }
}

/// Lifecycle of a step from one user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Locked,
    Available,
    Claimed,
    Expired,
    Exhausted,
}

#[must_use]
pub fn step_state(step: &Step, claimed: &ClaimedSet, as_of: Timestamp) -> StepState {
    if claimed.contains(step.id().as_str()) {
        return StepState::Claimed;
    }
    match window_phase(step, as_of) {
        WindowPhase::Expired { .. } => StepState::Expired,
        _ if !has_reward_capacity(step) => StepState::Exhausted,
        WindowPhase::Upcoming { .. } => StepState::Locked,
        _ if !is_within_window(step, as_of) => StepState::Locked,
        WindowPhase::Always | WindowPhase::Open { .. } => StepState::Available,
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub step_id: StepId,
    pub story_id: StoryId,
    pub reward_code: String,
    pub claimed_count: u32,
    /// `None` for unlimited rewards.
    pub remaining: Option<u32>,
    pub claimed_at: Timestamp,
}

/// Claim a step for the user.
///
/// On success the id joins `claimed`, a limited reward's `claimed_count`
/// rises by one, and a reward code is issued. On failure nothing is touched.
///
/// # Errors
///
/// Returns a [`ClaimError`] naming the first failed precondition.
pub fn claim(
    step: &mut Step,
    user: Option<Coordinate>,
    claimed: &mut ClaimedSet,
    as_of: Timestamp,
    issuer: &mut RewardCodeIssuer,
) -> Result<ClaimReceipt, ClaimError> {
    let eligibility = evaluate(step, user, claimed, as_of);
    if let Some(reason) = eligibility.failure() {
        log::debug!("claim on {} rejected: {reason}", step.id());
        return Err(ClaimError {
            step_id: step.id().clone(),
            reason,
        });
    }

    claimed.insert(step.id().clone());
    let reward = &mut step.reward;
    if reward.limited {
        let ceiling = reward.quantity.unwrap_or(u32::MAX);
        reward.claimed_count = reward.claimed_count.saturating_add(1).min(ceiling);
    }
    let reward_code = issuer.code_for(step.id(), &step.reward);
    log::debug!(
        "claimed {} at {:.1}m",
        step.id(),
        eligibility.distance_meters.unwrap_or_default()
    );
    Ok(ClaimReceipt {
        step_id: step.id().clone(),
        story_id: step.story_id().clone(),
        reward_code,
        claimed_count: step.reward.claimed_count,
        remaining: step.reward.remaining(),
        claimed_at: as_of,
    })
}

/// Forget every claim. Reward counters are deliberately left as they are.
pub fn clear_all_claims(claimed: &mut ClaimedSet) -> usize {
    let cleared = claimed.len();
    claimed.0.clear();
    cleared
}
