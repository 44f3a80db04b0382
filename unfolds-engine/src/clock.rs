//! Timestamp parsing for authored claiming windows.
//!
//! Authoring forms emit either full RFC 3339 instants or `datetime-local`
//! values without an offset (`2024-05-01T09:30`). Offset-less values are read
//! as UTC so evaluation does not depend on the host time zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::ValidationError;

pub type Timestamp = DateTime<Utc>;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse an authored timestamp string.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTimestamp`] if the value matches none of
/// the accepted shapes.
pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<Timestamp, ValidationError> {
    let value = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(ValidationError::InvalidTimestamp {
        field,
        value: raw.to_string(),
    })
}

/// Parse an optional field, treating blank strings as absent.
///
/// # Errors
///
/// Propagates [`parse_timestamp`] failures for non-blank values.
pub fn parse_optional(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<Timestamp>, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(field, value).map(Some),
    }
}

/// Canonical export form: RFC 3339 with millisecond precision and `Z`.
#[must_use]
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
