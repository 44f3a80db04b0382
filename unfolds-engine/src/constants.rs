//! Centralized tuning constants and storage keys for the Unfolds engine.
//!
//! Thresholds that shape discovery and authoring live here so they can only be
//! adjusted through reviewed code changes rather than through imported JSON.

// Geometry -----------------------------------------------------------------
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
pub const NEARBY_THRESHOLD_METERS: f64 = 1_000.0;
pub const CLOSE_THRESHOLD_METERS: f64 = 100.0;
pub const DEFAULT_NEAREST_COUNT: usize = 3;
/// Radius applied when a newer-schema step omits `claim_radius`.
pub const DEFAULT_CLAIM_RADIUS_METERS: f64 = 25.0;
pub const MIN_AUTHORED_RADIUS_METERS: f64 = 1.0;

// Authoring metadata -------------------------------------------------------
pub(crate) const MINUTES_PER_STEP: u32 = 5;
/// Walking pace used for duration estimates (~5 km/h).
pub(crate) const WALKING_METERS_PER_MINUTE: f64 = 80.0;
pub(crate) const MEDIUM_MIN_STEPS: usize = 6;
pub(crate) const HARD_MIN_STEPS: usize = 11;
pub(crate) const EPIC_MIN_STEPS: usize = 16;
pub(crate) const MEDIUM_MIN_DISTANCE_METERS: f64 = 2_000.0;
pub(crate) const HARD_MIN_DISTANCE_METERS: f64 = 5_000.0;
pub(crate) const EPIC_MIN_DISTANCE_METERS: f64 = 10_000.0;
pub(crate) const COUPON_PREFIX_MAX_LEN: usize = 10;

// Moderation priority ------------------------------------------------------
pub(crate) const PRIORITY_PUBLIC_BONUS: u32 = 3;
pub(crate) const PRIORITY_HIGH_MIN: u32 = 5;
pub(crate) const PRIORITY_MEDIUM_MIN: u32 = 3;
pub(crate) const PRIORITY_FRESH_HOURS: i64 = 24;
pub(crate) const PRIORITY_RECENT_HOURS: i64 = 72;

// Reward codes -------------------------------------------------------------
pub(crate) const DEFAULT_REWARD_PREFIX: &str = "REWARD";
pub(crate) const REWARD_TOKEN_DIGEST_CHARS: usize = 6;

// Persistence keys ---------------------------------------------------------
pub const KEY_CLAIMED_STEPS: &str = "claimedSteps";
pub const KEY_QUEST_DATABASE: &str = "questDatabase";
pub const KEY_UNFOLD_STORIES: &str = "unfolds_stories";
pub const KEY_CURRENT_USER: &str = "unfolds_current_user";
pub const KEY_COMPLETED_STORIES: &str = "unfolds_completed_stories";
pub const KEY_REWARDS: &str = "unfolds_rewards";
pub const KEY_REWARD_SEQUENCE: &str = "unfolds_reward_sequence";

pub const LEGACY_DATABASE_VERSION: &str = "1.0";

// Browser integration ------------------------------------------------------
pub const GEOLOCATION_TIMEOUT_MS: u32 = 10_000;
pub const GEOLOCATION_MAX_AGE_MS: u32 = 60_000;
