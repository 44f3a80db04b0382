//! Time-window and reward-capacity eligibility.
//!
//! Every function here is pure in `(step, as_of)`; proximity is handled by the
//! claim engine.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::model::Step;

/// `true` when the step has no window or `as_of` falls inside it, inclusive.
/// A window whose start is not before its due date never admits a claim.
#[must_use]
pub fn is_within_window(step: &Step, as_of: Timestamp) -> bool {
    step.claiming_window
        .as_ref()
        .is_none_or(|window| window.check_order().is_ok() && window.contains(as_of))
}

/// `true` unless an enabled, limited reward has been fully issued.
#[must_use]
pub fn has_reward_capacity(step: &Step) -> bool {
    let reward = &step.reward;
    if !reward.enabled || !reward.limited {
        return true;
    }
    reward
        .quantity
        .is_some_and(|quantity| reward.claimed_count < quantity)
}

#[must_use]
pub fn is_available(step: &Step, as_of: Timestamp) -> bool {
    is_within_window(step, as_of) && has_reward_capacity(step)
}

/// Where `as_of` sits relative to a step's claiming window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WindowPhase {
    Always,
    Upcoming { starts_at: Timestamp },
    Open { due_at: Timestamp },
    Expired { due_at: Timestamp },
}

#[must_use]
pub fn window_phase(step: &Step, as_of: Timestamp) -> WindowPhase {
    match step.claiming_window {
        None => WindowPhase::Always,
        Some(window) if as_of < window.starts_at() => WindowPhase::Upcoming {
            starts_at: window.starts_at(),
        },
        Some(window) if as_of > window.due_at() => WindowPhase::Expired {
            due_at: window.due_at(),
        },
        Some(window) => WindowPhase::Open {
            due_at: window.due_at(),
        },
    }
}

/// Display form of a step's reward inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stock", rename_all = "snake_case")]
pub enum RewardStock {
    None,
    Unlimited,
    Limited { remaining: u32, quantity: u32 },
}

#[must_use]
pub fn reward_stock(step: &Step) -> RewardStock {
    let reward = &step.reward;
    if !reward.enabled {
        return RewardStock::None;
    }
    match (reward.limited, reward.quantity) {
        (true, Some(quantity)) => RewardStock::Limited {
            remaining: quantity.saturating_sub(reward.claimed_count),
            quantity,
        },
        _ => RewardStock::Unlimited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::model::{ClaimingWindow, Reward, SchemaKind, StepDraft, Story};
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()
    }

    fn t1() -> Timestamp {
        t0() + Duration::hours(8)
    }

    fn step_with(window: Option<ClaimingWindow>, reward: Reward) -> Step {
        let mut story = Story::new("s", "S", SchemaKind::Legacy);
        let mut draft =
            StepDraft::new("Gate", Coordinate::new(1.0, 1.0).unwrap(), 10.0).with_reward(reward);
        draft.claiming_window = window;
        story.push_step(draft).unwrap().clone()
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = ClaimingWindow::new(t0(), t1()).unwrap();
        let step = step_with(Some(window), Reward::default());
        let ms = Duration::milliseconds(1);
        assert!(is_available(&step, t0()));
        assert!(is_available(&step, t1()));
        assert!(!is_available(&step, t0() - ms));
        assert!(!is_available(&step, t1() + ms));
    }

    #[test]
    fn exhausted_limited_reward_is_unavailable() {
        let step = step_with(None, Reward::limited(2).with_claimed(2));
        assert!(!has_reward_capacity(&step));
        assert!(!is_available(&step, t0()));
        let mut disabled = step.clone();
        disabled.reward.enabled = false;
        assert!(has_reward_capacity(&disabled));
    }

    #[test]
    fn phases_follow_the_clock() {
        let window = ClaimingWindow::new(t0(), t1()).unwrap();
        let step = step_with(Some(window), Reward::default());
        let ms = Duration::milliseconds(1);
        assert_eq!(
            window_phase(&step, t0() - ms),
            WindowPhase::Upcoming { starts_at: t0() }
        );
        assert_eq!(window_phase(&step, t0()), WindowPhase::Open { due_at: t1() });
        assert_eq!(window_phase(&step, t1()), WindowPhase::Open { due_at: t1() });
        assert_eq!(
            window_phase(&step, t1() + ms),
            WindowPhase::Expired { due_at: t1() }
        );
        let open = step_with(None, Reward::default());
        assert_eq!(window_phase(&open, t0()), WindowPhase::Always);
    }

    #[test]
    fn stock_reports_remaining() {
        assert_eq!(reward_stock(&step_with(None, Reward::default())), RewardStock::None);
        assert_eq!(
            reward_stock(&step_with(None, Reward::unlimited())),
            RewardStock::Unlimited
        );
        assert_eq!(
            reward_stock(&step_with(None, Reward::limited(5).with_claimed(2))),
            RewardStock::Limited {
                remaining: 3,
                quantity: 5
            }
        );
    }
}
