//! Publish-time checks and derived story metadata.

use crate::constants::{
    COUPON_PREFIX_MAX_LEN, EPIC_MIN_DISTANCE_METERS, EPIC_MIN_STEPS, HARD_MIN_DISTANCE_METERS,
    HARD_MIN_STEPS, MEDIUM_MIN_DISTANCE_METERS, MEDIUM_MIN_STEPS, MINUTES_PER_STEP,
    MIN_AUTHORED_RADIUS_METERS, WALKING_METERS_PER_MINUTE,
};
use crate::error::{ValidationError, ValidationReport};
use crate::geo::path_length_meters;
use crate::model::{AggregatedMetadata, Difficulty, Step, Story};
use crate::numbers::{floor_f64_to_u32, usize_to_u32};

/// Check a story for publication, collecting every problem instead of
/// stopping at the first.
///
/// # Errors
///
/// Returns a [`ValidationReport`] listing each failed check.
pub fn validate_for_publish(story: &Story) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();
    if story.title.trim().is_empty() {
        report.push(ValidationError::empty("title"));
    }
    if story.description.trim().is_empty() {
        report.push(ValidationError::empty("description"));
    }
    if story.steps().is_empty() {
        report.push(ValidationError::NoSteps);
    }
    for step in story.steps() {
        check_step(step, &mut report);
    }
    report.into_result()
}

fn check_step(step: &Step, report: &mut ValidationReport) {
    let label = |field: &str| format!("step {} {field}", step.order);
    if step.name.trim().is_empty() {
        report.push(ValidationError::empty(label("name")));
    }
    if step.description.trim().is_empty() {
        report.push(ValidationError::empty(label("description")));
    }
    if let Err(err) = step.coordinates.validated() {
        report.push(err);
    }
    let radius = step.claiming_radius_meters;
    if radius.is_nan() || radius < MIN_AUTHORED_RADIUS_METERS {
        report.push(ValidationError::InvalidRadius { value: radius });
    }
    if let Some(Err(err)) = step.claiming_window.as_ref().map(|w| w.check_order()) {
        report.push(err);
    }
    if let Err(err) = step.reward.validate() {
        report.push(err);
    }
}

/// Derive distance, duration and difficulty from an ordered step list.
#[must_use]
pub fn aggregate_metadata(steps: &[Step]) -> AggregatedMetadata {
    let points: Vec<_> = steps.iter().map(|step| step.coordinates).collect();
    let total_distance_meters = path_length_meters(&points);
    let walking = floor_f64_to_u32(total_distance_meters / WALKING_METERS_PER_MINUTE);
    let step_count = usize_to_u32(steps.len());
    AggregatedMetadata {
        difficulty: difficulty_for(steps.len(), total_distance_meters),
        estimated_duration_minutes: step_count
            .saturating_mul(MINUTES_PER_STEP)
            .saturating_add(walking),
        total_distance_meters,
        total_steps: step_count,
    }
}

#[must_use]
pub fn difficulty_for(steps: usize, distance_meters: f64) -> Difficulty {
    if steps >= EPIC_MIN_STEPS || distance_meters > EPIC_MIN_DISTANCE_METERS {
        Difficulty::Epic
    } else if steps >= HARD_MIN_STEPS || distance_meters > HARD_MIN_DISTANCE_METERS {
        Difficulty::Hard
    } else if steps >= MEDIUM_MIN_STEPS || distance_meters > MEDIUM_MIN_DISTANCE_METERS {
        Difficulty::Medium
    } else {
        Difficulty::Easy
    }
}

/// Uppercase ASCII alphanumerics of `name`, truncated for coupon codes.
#[must_use]
pub fn coupon_prefix(name: &str) -> String {
    name.chars()
        .map(|ch| ch.to_ascii_uppercase())
        .filter(char::is_ascii_alphanumeric)
        .take(COUPON_PREFIX_MAX_LEN)
        .collect()
}

/// Recompute and store a story's aggregated metadata.
pub fn refresh_metadata(story: &mut Story) {
    story.metadata = aggregate_metadata(story.steps());
}
