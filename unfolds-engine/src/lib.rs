//! Unfolds Quest Engine
//!
//! Platform-agnostic quest logic for Unfolds: schema normalization, step
//! availability, proximity, claims and reward codes. Storage and story
//! sources are supplied by the platform through [`KeyValueStore`] and
//! [`StoryLoader`].

pub mod authoring;
pub mod availability;
pub mod claim;
pub mod clock;
pub mod constants;
pub mod engine;
pub mod error;
pub mod geo;
pub mod model;
pub mod moderation;
pub mod numbers;
pub mod progress;
pub mod query;
pub mod reward_code;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use authoring::{aggregate_metadata, coupon_prefix, refresh_metadata, validate_for_publish};
pub use availability::{
    RewardStock, WindowPhase, has_reward_capacity, is_available, is_within_window, reward_stock,
    window_phase,
};
pub use claim::{
    ClaimEligibility, ClaimReceipt, ClaimedSet, StepState, StepStatus, is_user_in_radius,
    step_state,
};
pub use clock::{Timestamp, format_timestamp, parse_timestamp};
pub use engine::{ImportSummary, QuestEngine};
pub use error::{
    ClaimError, ClaimFailure, EngineError, NotFoundError, PersistenceError, ValidationError,
    ValidationReport,
};
pub use geo::{Coordinate, DistanceBand, distance_meters, format_distance};
pub use model::{
    AggregatedMetadata, Availability, ClaimingWindow, Difficulty, Reward, SchemaKind, Step,
    StepDraft, StepId, Story, StoryId, StoryStatus,
};
pub use moderation::{ModerationFilter, Priority, ReviewAction, ReviewRecord, ReviewRequest};
pub use progress::{Achievement, EngineEvent, ProgressLedger, UserProfile, UserStats};
pub use query::{QueryContext, StepFilter, StepSort, StoryGroup, nearest_n};
pub use reward_code::RewardCodeIssuer;
pub use schema::{LegacyDatabase, StoryDocument, UnfoldStory, normalize_json, parse_documents};
pub use storage::{KeyValueStore, MemoryStore, StoryLoader};
