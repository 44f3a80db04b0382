//! Views over the step and story collections: nearest-N, named filters,
//! sort keys, grouping and text search.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::availability::is_available;
use crate::claim::ClaimedSet;
use crate::clock::Timestamp;
use crate::constants::NEARBY_THRESHOLD_METERS;
use crate::error::ValidationError;
use crate::geo::{Coordinate, distance_meters};
use crate::model::{Difficulty, Step, StoryId, Story, StoryStatus};

/// Inputs shared by every time- and location-dependent view.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub user: Option<Coordinate>,
    pub claimed: &'a ClaimedSet,
    pub as_of: Timestamp,
}

impl QueryContext<'_> {
    fn distance(&self, step: &Step) -> Option<f64> {
        step.distance_from_user
            .or_else(|| self.user.map(|at| distance_meters(at, step.coordinates)))
    }

    /// Available now and within the claiming radius of the user.
    fn claimable(&self, step: &Step) -> bool {
        is_available(step, self.as_of)
            && self
                .distance(step)
                .is_some_and(|d| d <= step.claiming_radius_meters)
    }
}

/// Recompute every step's transient distance from `user`.
pub fn update_distances(steps: &mut [Step], user: Coordinate) {
    for step in steps {
        step.distance_from_user = Some(distance_meters(user, step.coordinates));
    }
}

fn by_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(f64::INFINITY)
        .total_cmp(&b.unwrap_or(f64::INFINITY))
}

/// The `n` steps closest to `user`, nearest first; ties keep input order.
pub fn nearest_n(steps: &mut [Step], user: Coordinate, n: usize) -> Vec<&Step> {
    update_distances(steps, user);
    let mut ranked: Vec<&Step> = steps.iter().collect();
    ranked.sort_by(|a, b| by_distance(a.distance_from_user, b.distance_from_user));
    ranked.truncate(n);
    ranked
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFilter {
    #[default]
    All,
    Available,
    Nearby,
    Claimed,
    Unclaimed,
}

impl StepFilter {
    #[must_use]
    pub fn matches(self, step: &Step, ctx: &QueryContext<'_>) -> bool {
        match self {
            Self::All => true,
            Self::Available => ctx.claimable(step),
            Self::Nearby => ctx
                .distance(step)
                .is_some_and(|d| d <= NEARBY_THRESHOLD_METERS),
            Self::Claimed => ctx.claimed.contains(step.id().as_str()),
            Self::Unclaimed => !ctx.claimed.contains(step.id().as_str()),
        }
    }
}

impl FromStr for StepFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "available" => Ok(Self::Available),
            "nearby" => Ok(Self::Nearby),
            "claimed" => Ok(Self::Claimed),
            "unclaimed" => Ok(Self::Unclaimed),
            other => Err(ValidationError::UnrecognizedDocument {
                reason: format!("unknown step filter {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSort {
    #[default]
    Distance,
    Name,
    Story,
    Availability,
}

impl FromStr for StepSort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "distance" => Ok(Self::Distance),
            "name" => Ok(Self::Name),
            "story" => Ok(Self::Story),
            "availability" => Ok(Self::Availability),
            other => Err(ValidationError::UnrecognizedDocument {
                reason: format!("unknown step sort {other:?}"),
            }),
        }
    }
}

#[must_use]
pub fn filter_steps<'a, I>(steps: I, filter: StepFilter, ctx: &QueryContext<'_>) -> Vec<&'a Step>
where
    I: IntoIterator<Item = &'a Step>,
{
    steps
        .into_iter()
        .filter(|step| filter.matches(step, ctx))
        .collect()
}

fn text_order(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Stable sort in place.
pub fn sort_steps(steps: &mut [&Step], sort: StepSort, ctx: &QueryContext<'_>) {
    match sort {
        StepSort::Distance => {
            steps.sort_by(|a, b| by_distance(ctx.distance(a), ctx.distance(b)));
        }
        StepSort::Name => steps.sort_by(|a, b| text_order(&a.name, &b.name)),
        StepSort::Story => steps.sort_by(|a, b| text_order(&a.story_name, &b.story_name)),
        StepSort::Availability => steps.sort_by_key(|step| !ctx.claimable(step)),
    }
}

/// Steps of one story within a filtered view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryGroup<'a> {
    pub story_id: StoryId,
    pub story_name: String,
    pub steps: Vec<&'a Step>,
    pub total: usize,
    pub claimed: usize,
    pub available: usize,
}

/// Group steps by story in first-seen order.
#[must_use]
pub fn group_by_story<'a>(steps: &[&'a Step], ctx: &QueryContext<'_>) -> Vec<StoryGroup<'a>> {
    let mut groups: Vec<StoryGroup<'a>> = Vec::new();
    for &step in steps {
        let index = match groups.iter().position(|g| &g.story_id == step.story_id()) {
            Some(index) => index,
            None => {
                groups.push(StoryGroup {
                    story_id: step.story_id().clone(),
                    story_name: step.story_name.clone(),
                    steps: Vec::new(),
                    total: 0,
                    claimed: 0,
                    available: 0,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[index];
        group.steps.push(step);
        group.total += 1;
        if ctx.claimed.contains(step.id().as_str()) {
            group.claimed += 1;
        }
        if ctx.claimable(step) {
            group.available += 1;
        }
    }
    groups
}

/// Case-insensitive match on step name, description or story name. A blank
/// query matches nothing.
#[must_use]
pub fn search_steps<'a, I>(steps: I, query: &str) -> Vec<&'a Step>
where
    I: IntoIterator<Item = &'a Step>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    steps
        .into_iter()
        .filter(|step| {
            [&step.name, &step.description, &step.story_name]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Case-insensitive match on story title or description. A blank query
/// returns every story.
#[must_use]
pub fn search_stories<'a>(stories: &'a [Story], query: &str) -> Vec<&'a Story> {
    let needle = query.trim().to_lowercase();
    stories
        .iter()
        .filter(|story| {
            needle.is_empty()
                || format!("{} {}", story.title, story.description)
                    .to_lowercase()
                    .contains(&needle)
        })
        .collect()
}

#[must_use]
pub fn filter_by_difficulty(stories: &[Story], difficulty: Difficulty) -> Vec<&Story> {
    stories
        .iter()
        .filter(|story| story.metadata.difficulty == difficulty)
        .collect()
}

#[must_use]
pub fn published_stories(stories: &[Story]) -> Vec<&Story> {
    stories
        .iter()
        .filter(|story| story.status == StoryStatus::Published)
        .collect()
}

/// Stories ordered by distance from `user` to their first step; stories
/// without steps sort last.
#[must_use]
pub fn stories_by_distance(stories: &[Story], user: Coordinate) -> Vec<(&Story, Option<f64>)> {
    let mut ranked: Vec<_> = stories
        .iter()
        .map(|story| {
            let distance = story
                .steps()
                .first()
                .map(|step| distance_meters(user, step.coordinates));
            (story, distance)
        })
        .collect();
    ranked.sort_by(|a, b| by_distance(a.1, b.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Reward, SchemaKind, StepDraft, StepId};
    use chrono::{TimeZone, Utc};

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn origin() -> Coordinate {
        Coordinate::new(0.0, 0.0).unwrap()
    }

    /// Point `meters` north of the origin.
    fn north(meters: f64) -> Coordinate {
        let lat = (meters / crate::constants::EARTH_RADIUS_METERS).to_degrees();
        Coordinate::new(lat, 0.0).unwrap()
    }

    fn story(id: &str, title: &str, stops: &[(&str, f64)]) -> Story {
        let mut story = Story::new(id, title, SchemaKind::Unfold);
        for (name, meters) in stops {
            let draft =
                StepDraft::new(*name, north(*meters), 25.0).with_reward(Reward::unlimited());
            story.push_step(draft).unwrap();
        }
        story
    }

    #[test]
    fn nearest_three_in_distance_order() {
        let mut steps: Vec<Step> = story(
            "s",
            "S",
            &[("d50", 50.0), ("d10", 10.0), ("d30", 30.0), ("d20", 20.0), ("d40", 40.0)],
        )
        .steps()
        .to_vec();
        let names: Vec<_> = nearest_n(&mut steps, origin(), 3)
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, ["d10", "d20", "d30"]);
    }

    #[test]
    fn filters_partition_claimed() {
        let s = story("s", "S", &[("a", 10.0), ("b", 500.0), ("c", 5_000.0)]);
        let claimed: ClaimedSet = [s.steps()[0].id().clone()].into_iter().collect();
        let ctx = QueryContext {
            user: Some(origin()),
            claimed: &claimed,
            as_of: now(),
        };
        let names = |filter| {
            filter_steps(s.steps(), filter, &ctx)
                .iter()
                .map(|step| step.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(StepFilter::All).len(), 3);
        assert_eq!(names(StepFilter::Available), ["a"]);
        assert_eq!(names(StepFilter::Nearby), ["a", "b"]);
        assert_eq!(names(StepFilter::Claimed), ["a"]);
        assert_eq!(names(StepFilter::Unclaimed), ["b", "c"]);
    }

    #[test]
    fn available_needs_a_location() {
        let s = story("s", "S", &[("a", 0.0)]);
        let claimed = ClaimedSet::new();
        let ctx = QueryContext {
            user: None,
            claimed: &claimed,
            as_of: now(),
        };
        assert!(filter_steps(s.steps(), StepFilter::Available, &ctx).is_empty());
        assert!(filter_steps(s.steps(), StepFilter::Nearby, &ctx).is_empty());
    }

    #[test]
    fn sorts_are_stable_and_missing_distance_last() {
        let a = story("a", "beta", &[("Zed", 30.0), ("alpha", 5.0)]);
        let b = story("b", "Alpha", &[("Mid", 2_000.0)]);
        let claimed = ClaimedSet::new();
        let ctx = QueryContext {
            user: Some(origin()),
            claimed: &claimed,
            as_of: now(),
        };
        let mut all: Vec<&Step> = a.steps().iter().chain(b.steps()).collect();

        sort_steps(&mut all, StepSort::Name, &ctx);
        assert_eq!(
            all.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            ["alpha", "Mid", "Zed"]
        );

        sort_steps(&mut all, StepSort::Story, &ctx);
        assert_eq!(all[0].story_name, "Alpha");

        sort_steps(&mut all, StepSort::Availability, &ctx);
        assert_eq!(all[0].name, "alpha");

        let no_user = QueryContext { user: None, ..ctx };
        let mut mixed = a.steps().to_vec();
        mixed[1].distance_from_user = Some(1.0);
        let mut refs: Vec<&Step> = mixed.iter().collect();
        sort_steps(&mut refs, StepSort::Distance, &no_user);
        assert_eq!(refs[0].name, "alpha");
        assert_eq!(refs[1].name, "Zed");
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let a = story("a", "A", &[("a1", 0.0), ("a2", 900.0)]);
        let b = story("b", "B", &[("b1", 10.0)]);
        let claimed: ClaimedSet = [StepId::from(a.steps()[1].id().as_str())].into_iter().collect();
        let ctx = QueryContext {
            user: Some(origin()),
            claimed: &claimed,
            as_of: now(),
        };
        let steps: Vec<&Step> = vec![&b.steps()[0], &a.steps()[0], &a.steps()[1]];
        let groups = group_by_story(&steps, &ctx);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].story_name, "B");
        assert_eq!((groups[1].total, groups[1].claimed, groups[1].available), (2, 1, 1));
    }

    #[test]
    fn search_and_story_views() {
        let mut a = story("a", "Harbor Walk", &[("Lighthouse", 10.0)]);
        a.status = StoryStatus::Published;
        let b = story("b", "Forest", &[("Old Oak", 3_000.0)]);
        let stories = vec![b, a];

        let hits = search_steps(stories.iter().flat_map(Story::steps), "HARBOR");
        assert_eq!(hits.len(), 1);
        assert!(search_steps(stories.iter().flat_map(Story::steps), " ").is_empty());

        assert_eq!(search_stories(&stories, "forest").len(), 1);
        assert_eq!(search_stories(&stories, "").len(), 2);
        assert_eq!(published_stories(&stories).len(), 1);
        assert_eq!(filter_by_difficulty(&stories, Difficulty::Easy).len(), 2);

        let ranked = stories_by_distance(&stories, origin());
        assert_eq!(ranked[0].0.title, "Harbor Walk");
    }

    #[test]
    fn names_parse() {
        assert_eq!("Nearby".parse::<StepFilter>().unwrap(), StepFilter::Nearby);
        assert_eq!("availability".parse::<StepSort>().unwrap(), StepSort::Availability);
        assert!("closest".parse::<StepSort>().is_err());
    }
}
