//! Boundary adapters between the two authored document shapes and the
//! canonical [`Story`](crate::model::Story).

pub mod legacy;
pub mod unfold;

pub use legacy::{
    LegacyCoordinates, LegacyDatabase, LegacyDatabaseMetadata, LegacyQuest, LegacyReward,
    LegacyStep, LegacyStoryHeader, LegacyWindow, from_legacy, to_legacy,
};
pub use unfold::{
    UnfoldGeo, UnfoldMetadata, UnfoldReward, UnfoldStep, UnfoldStory, UnfoldWindow, from_unfold,
    to_unfold,
};

use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::model::{SchemaKind, Story};

/// A story document in either authored shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoryDocument {
    Legacy(LegacyQuest),
    Unfold(UnfoldStory),
}

impl StoryDocument {
    #[must_use]
    pub const fn kind(&self) -> SchemaKind {
        match self {
            Self::Legacy(_) => SchemaKind::Legacy,
            Self::Unfold(_) => SchemaKind::Unfold,
        }
    }

    /// Normalize into the canonical record.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's [`ValidationError`].
    pub fn normalize(&self) -> Result<Story, ValidationError> {
        match self {
            Self::Legacy(quest) => from_legacy(quest),
            Self::Unfold(doc) => from_unfold(doc),
        }
    }

    /// Classify a single JSON object by its discriminating keys: `story` for
    /// legacy quests, `title` for newer stories.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnrecognizedDocument`] when neither key is
    /// present or the object does not fit the matching shape.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let Some(object) = value.as_object() else {
            return Err(unrecognized("expected a JSON object"));
        };
        if object.contains_key("story") {
            serde_json::from_value(value)
                .map(Self::Legacy)
                .map_err(|err| unrecognized(format!("legacy quest: {err}")))
        } else if object.contains_key("title") {
            serde_json::from_value(value)
                .map(Self::Unfold)
                .map_err(|err| unrecognized(format!("unfold story: {err}")))
        } else {
            Err(unrecognized("expected a `story` or `title` field"))
        }
    }
}

fn unrecognized(reason: impl Into<String>) -> ValidationError {
    ValidationError::UnrecognizedDocument {
        reason: reason.into(),
    }
}

/// Split an imported payload into story documents.
///
/// Accepts a single story of either shape, `{"quests": [...]}`,
/// `{"unfolds": [...]}`, or a bare JSON array of stories.
///
/// # Errors
///
/// Fails on malformed JSON or when any contained document is unrecognized.
pub fn parse_documents(json: &str) -> Result<Vec<StoryDocument>, ValidationError> {
    let value: Value =
        serde_json::from_str(json).map_err(|err| unrecognized(format!("invalid JSON: {err}")))?;
    split_bundle(value)
}

fn split_bundle(value: Value) -> Result<Vec<StoryDocument>, ValidationError> {
    match value {
        Value::Array(items) => items.into_iter().map(StoryDocument::from_value).collect(),
        Value::Object(mut object) => {
            for key in ["quests", "unfolds"] {
                if let Some(Value::Array(items)) = object.remove(key) {
                    return items.into_iter().map(StoryDocument::from_value).collect();
                }
            }
            StoryDocument::from_value(Value::Object(object))
                .map(|doc| vec![doc])
        }
        _ => Err(unrecognized("expected a JSON object or array")),
    }
}

/// Normalize every document, stopping at the first failure.
///
/// # Errors
///
/// Propagates parsing and normalization failures.
pub fn normalize_json(json: &str) -> Result<Vec<Story>, ValidationError> {
    parse_documents(json)?
        .iter()
        .map(StoryDocument::normalize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy() -> Value {
        json!({
            "story": {"name": "A", "description": "a"},
            "steps": [{"name": "s", "coordinates": {"x": 1.0, "y": 2.0}, "claimingRadius": 10}]
        })
    }

    fn unfold() -> Value {
        json!({
            "title": "B",
            "steps": [{"name": "s", "geo": {"lat": 1.0, "lng": 2.0}, "claim_radius": 10}]
        })
    }

    #[test]
    fn classifies_each_bundle_shape() {
        let single = parse_documents(&legacy().to_string()).unwrap();
        assert_eq!(single[0].kind(), SchemaKind::Legacy);

        let quests = json!({"quests": [legacy(), legacy()], "metadata": {"version": "1.0"}});
        assert_eq!(parse_documents(&quests.to_string()).unwrap().len(), 2);

        let unfolds = json!({"unfolds": [unfold()]});
        let docs = parse_documents(&unfolds.to_string()).unwrap();
        assert_eq!(docs[0].kind(), SchemaKind::Unfold);

        let mixed = json!([legacy(), unfold()]);
        let stories = normalize_json(&mixed.to_string()).unwrap();
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[1].origin, SchemaKind::Unfold);
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(matches!(
            parse_documents(r#"{"name": "x"}"#),
            Err(ValidationError::UnrecognizedDocument { .. })
        ));
        assert!(parse_documents("not json").is_err());
        assert!(parse_documents("42").is_err());
        let missing_coords = json!({"story": {"name": "A"}, "steps": [{"name": "s"}]});
        assert!(parse_documents(&missing_coords.to_string()).is_err());
    }
}
