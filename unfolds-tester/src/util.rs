use anyhow::{Context, Result, bail};
use chrono::Utc;
use regex::Regex;
use unfolds_engine::{Coordinate, Timestamp, parse_timestamp};

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse `--seeds`; negative literals fold to their magnitude.
pub fn parse_seeds(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seeds = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Ok(value) = token.parse::<u64>() {
            seeds.push(value);
        } else if let Ok(value) = token.parse::<i64>() {
            seeds.push(value.unsigned_abs());
        } else {
            bail!("invalid seed {token:?}");
        }
    }
    if seeds.is_empty() {
        bail!("at least one seed is required");
    }
    seeds.dedup();
    Ok(seeds)
}

/// Parse `lat,lng`.
pub fn parse_location(raw: &str) -> Result<Coordinate> {
    let pattern = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$")
        .context("location pattern")?;
    let Some(caps) = pattern.captures(raw) else {
        bail!("expected `lat,lng`, got {raw:?}");
    };
    let lat: f64 = caps[1].parse().context("latitude")?;
    let lng: f64 = caps[2].parse().context("longitude")?;
    Ok(Coordinate::new(lat, lng)?)
}

/// Parse `--now`, defaulting to the wall clock.
pub fn resolve_now(raw: Option<&str>) -> Result<Timestamp> {
    raw.map_or_else(
        || Ok(Utc::now()),
        |value| Ok(parse_timestamp("now", value)?),
    )
}
