//! Scenario catalog. Every scenario builds its own engine over a fresh
//! in-memory store, loads the selected story files and checks one behavior
//! end to end.

use anyhow::{Context, Result, anyhow, bail, ensure};
use chrono::Duration;
use std::collections::BTreeMap;
use unfolds_engine::constants::{DEFAULT_NEAREST_COUNT, KEY_QUEST_DATABASE, KEY_UNFOLD_STORIES};
use unfolds_engine::{
    ClaimFailure, Coordinate, EngineError, MemoryStore, QuestEngine, SchemaKind, Step, Story,
    StoryLoader, Timestamp, is_available, is_within_window, normalize_json,
};

use crate::loader::StoryFiles;

pub struct ScenarioCtx<'a> {
    pub stories: &'a StoryFiles,
    pub seed: u64,
    pub now: Timestamp,
    /// Where the explorer stands for location-dependent views.
    pub at: Option<Coordinate>,
    pub verbose: bool,
}

type ScenarioFn = fn(&ScenarioCtx<'_>) -> Result<()>;

pub struct Scenario {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    run: ScenarioFn,
}

impl Scenario {
    pub fn run(&self, ctx: &ScenarioCtx<'_>) -> Result<()> {
        (self.run)(ctx)
    }
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        key: "smoke",
        name: "Smoke",
        description: "Load stories, check step invariants and the nearest list",
        run: smoke,
    },
    Scenario {
        key: "claim-flow",
        name: "Claim Flow",
        description: "Claim a step in radius, refuse a repeat, survive a reload",
        run: claim_flow,
    },
    Scenario {
        key: "window-boundaries",
        name: "Window Boundaries",
        description: "Windows include both edges and refuse claims outside them",
        run: window_boundaries,
    },
    Scenario {
        key: "limited-capacity",
        name: "Limited Capacity",
        description: "Limited rewards count down and never exceed their quantity",
        run: limited_capacity,
    },
    Scenario {
        key: "schema-roundtrip",
        name: "Schema Round Trip",
        description: "Stored documents normalize back to the same steps",
        run: schema_roundtrip,
    },
    Scenario {
        key: "clear-claims",
        name: "Clear Claims",
        description: "Clearing claims keeps reward counters, in memory and on reload",
        run: clear_claims,
    },
];

pub fn list_scenarios() -> impl Iterator<Item = (&'static str, &'static str)> {
    SCENARIOS.iter().map(|s| (s.key, s.description))
}

pub fn get_scenario(key: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.key == key)
}

/// Resolve the `--scenarios` list; `all` expands to the whole catalog.
pub fn expand_scenarios(keys: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = keys.iter().filter(|k| *k != "all").cloned().collect();
    if keys.iter().any(|k| k == "all") {
        for scenario in SCENARIOS {
            if !expanded.iter().any(|k| k == scenario.key) {
                expanded.push(scenario.key.to_string());
            }
        }
    }
    expanded
}

fn fresh_engine(ctx: &ScenarioCtx<'_>) -> Result<(MemoryStore, QuestEngine<MemoryStore>)> {
    let store = MemoryStore::new();
    let mut engine = QuestEngine::new(store.clone(), ctx.seed);
    let summary = engine
        .load_from(ctx.stories, ctx.now)
        .context("loading story files")?;
    ensure!(!summary.imported.is_empty(), "no stories were imported");
    Ok((store, engine))
}

/// First step that can be claimed right now by someone standing on it.
fn claimable_step(engine: &QuestEngine<MemoryStore>, as_of: Timestamp) -> Result<Step> {
    engine
        .steps()
        .find(|step| is_available(step, as_of) && !engine.claimed().contains(step.id().as_str()))
        .cloned()
        .ok_or_else(|| anyhow!("no claimable step at {as_of}"))
}

fn reward_counters(engine: &QuestEngine<MemoryStore>) -> BTreeMap<String, u32> {
    engine
        .steps()
        .map(|step| (step.id().to_string(), step.reward.claimed_count))
        .collect()
}

fn expect_failure(
    result: Result<impl std::fmt::Debug, EngineError>,
    want: ClaimFailure,
) -> Result<()> {
    match result {
        Ok(receipt) => bail!("expected {want:?}, claim succeeded: {receipt:?}"),
        Err(err) => {
            ensure!(
                err.claim_failure() == Some(want),
                "expected {want:?}, got {err}"
            );
            Ok(())
        }
    }
}

fn smoke(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let docs = ctx
        .stories
        .load_documents()
        .context("parsing story files")?;
    let (_, mut engine) = fresh_engine(ctx)?;
    ensure!(
        engine.stories().len() <= docs.len(),
        "more stories loaded than documents supplied"
    );

    for story in engine.stories() {
        ensure!(!story.steps().is_empty(), "story {} has no steps", story.id());
        for (index, step) in story.steps().iter().enumerate() {
            ensure!(
                step.claiming_radius_meters > 0.0,
                "step {} has radius {}",
                step.id(),
                step.claiming_radius_meters
            );
            ensure!(
                usize::try_from(step.order).ok() == Some(index + 1),
                "step {} is out of order",
                step.id()
            );
            if let (true, Some(quantity)) = (step.reward.limited, step.reward.quantity) {
                ensure!(
                    step.reward.claimed_count <= quantity,
                    "step {} over-claimed",
                    step.id()
                );
            }
        }
    }

    ensure!(
        engine.nearest(DEFAULT_NEAREST_COUNT).is_empty(),
        "nearest must be empty before a location is known"
    );

    let at = match ctx.at {
        Some(at) => at,
        None => {
            let first = engine
                .steps()
                .next()
                .ok_or_else(|| anyhow!("no steps loaded"))?;
            first.coordinates
        }
    };
    engine.update_location(at);
    let nearest = engine.nearest(DEFAULT_NEAREST_COUNT);
    ensure!(
        nearest.len() == DEFAULT_NEAREST_COUNT.min(engine.steps().count()),
        "expected {DEFAULT_NEAREST_COUNT} nearest steps, got {}",
        nearest.len()
    );
    let distances: Vec<f64> = nearest
        .iter()
        .map(|step| step.distance_from_user.unwrap_or(f64::INFINITY))
        .collect();
    ensure!(
        distances.windows(2).all(|pair| pair[0] <= pair[1]),
        "nearest steps are not sorted by distance: {distances:?}"
    );
    if ctx.verbose {
        for step in nearest {
            log::info!(
                "nearest: {} ({:.0} m)",
                step.name,
                step.distance_from_user.unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn claim_flow(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let (store, mut engine) = fresh_engine(ctx)?;
    let target = claimable_step(&engine, ctx.now)?;
    let id = target.id().to_string();

    engine.update_location(target.coordinates);
    let receipt = engine.claim(&id, ctx.now).context("claiming in radius")?;
    ensure!(receipt.step_id.as_str() == id, "receipt names {}", receipt.step_id);
    ensure!(!receipt.reward_code.is_empty(), "empty reward code");
    ensure!(engine.claimed().contains(&id), "step not recorded as claimed");
    expect_failure(engine.claim(&id, ctx.now), ClaimFailure::AlreadyClaimed)?;

    let reloaded = QuestEngine::load(store, ctx.seed);
    ensure!(reloaded.claimed().contains(&id), "claim lost on reload");
    ensure!(
        reward_counters(&reloaded) == reward_counters(&engine),
        "reward counters changed on reload"
    );
    ensure!(
        reloaded.issuer_sequence() == engine.issuer_sequence(),
        "issuer sequence changed on reload"
    );

    let (_, mut fresh) = fresh_engine(ctx)?;
    let away = Coordinate::new(
        (target.coordinates.lat + 0.05).min(90.0),
        target.coordinates.lng,
    )?;
    fresh.update_location(away);
    expect_failure(fresh.claim(&id, ctx.now), ClaimFailure::TooFar)?;
    ensure!(fresh.claimed().is_empty(), "failed claim was recorded");
    Ok(())
}

fn window_boundaries(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let (_, engine) = fresh_engine(ctx)?;
    let windowed: Vec<Step> = engine
        .steps()
        .filter(|step| step.claiming_window.is_some())
        .cloned()
        .collect();
    if windowed.is_empty() {
        log::warn!("no step has a claiming window; nothing to check");
        return Ok(());
    }

    let tick = Duration::milliseconds(1);
    for step in &windowed {
        let Some(window) = step.claiming_window else {
            continue;
        };
        ensure!(is_within_window(step, window.starts_at()), "{}: start edge excluded", step.id());
        ensure!(is_within_window(step, window.due_at()), "{}: due edge excluded", step.id());
        ensure!(
            !is_within_window(step, window.starts_at() - tick),
            "{}: open before start",
            step.id()
        );
        ensure!(
            !is_within_window(step, window.due_at() + tick),
            "{}: open after due",
            step.id()
        );
    }

    let Some(step) = windowed
        .iter()
        .find(|step| step.reward.remaining() != Some(0))
    else {
        return Ok(());
    };
    let Some(window) = step.claiming_window else {
        return Ok(());
    };
    let id = step.id().to_string();
    let (_, mut late) = fresh_engine(ctx)?;
    late.update_location(step.coordinates);
    expect_failure(late.claim(&id, window.due_at() + tick), ClaimFailure::NotAvailable)?;
    late.claim(&id, window.due_at())
        .with_context(|| format!("claiming {id} on its due instant"))?;
    Ok(())
}

fn limited_capacity(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let (_, mut engine) = fresh_engine(ctx)?;
    let limited: Vec<Step> = engine
        .steps()
        .filter(|step| step.reward.limited)
        .cloned()
        .collect();
    if limited.is_empty() {
        log::warn!("no limited rewards; nothing to check");
        return Ok(());
    }

    for step in &limited {
        let id = step.id().to_string();
        let as_of = step
            .claiming_window
            .map_or(ctx.now, |window| window.starts_at());
        engine.update_location(step.coordinates);
        match step.reward.remaining() {
            Some(0) => {
                expect_failure(engine.claim(&id, as_of), ClaimFailure::NotAvailable)?;
            }
            Some(remaining) => {
                let receipt = engine
                    .claim(&id, as_of)
                    .with_context(|| format!("claiming limited step {id}"))?;
                ensure!(
                    receipt.remaining == Some(remaining - 1),
                    "{id}: expected {} left, receipt says {:?}",
                    remaining - 1,
                    receipt.remaining
                );
                ensure!(
                    receipt.claimed_count == step.reward.claimed_count + 1,
                    "{id}: claimed count did not advance by one"
                );
            }
            None => bail!("{id}: limited reward without a quantity"),
        }
    }

    for step in engine.steps().filter(|step| step.reward.limited) {
        let quantity = step.reward.quantity.unwrap_or_default();
        ensure!(
            step.reward.claimed_count <= quantity,
            "{}: {} claimed of {quantity}",
            step.id(),
            step.reward.claimed_count
        );
    }
    Ok(())
}

fn schema_roundtrip(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let (store, engine) = fresh_engine(ctx)?;

    let reread = |key: &str| -> Result<Vec<Story>> {
        let raw = store
            .raw(key)
            .ok_or_else(|| anyhow!("{key} was not written"))?;
        normalize_json(&raw).with_context(|| format!("re-reading {key}"))
    };
    let legacy = reread(KEY_QUEST_DATABASE)?;
    let unfold = reread(KEY_UNFOLD_STORIES)?;

    for story in engine.stories() {
        let restored = match story.origin {
            SchemaKind::Legacy => &legacy,
            SchemaKind::Unfold => &unfold,
        };
        let back = restored
            .iter()
            .find(|candidate| candidate.id() == story.id())
            .ok_or_else(|| anyhow!("story {} missing from export", story.id()))?;
        ensure!(back.title == story.title, "{}: title changed", story.id());
        ensure!(
            back.steps().len() == story.steps().len(),
            "{}: step count changed",
            story.id()
        );
        for (before, after) in story.steps().iter().zip(back.steps()) {
            ensure!(after.id() == before.id(), "{}: step id changed", before.id());
            ensure!(after.name == before.name, "{}: name changed", before.id());
            ensure!(
                after.coordinates == before.coordinates,
                "{}: coordinates changed",
                before.id()
            );
            ensure!(
                after.claiming_radius_meters.to_bits() == before.claiming_radius_meters.to_bits(),
                "{}: radius changed",
                before.id()
            );
            ensure!(
                after.claiming_window == before.claiming_window,
                "{}: window changed",
                before.id()
            );
            ensure!(
                (after.reward.limited, after.reward.quantity, after.reward.claimed_count)
                    == (before.reward.limited, before.reward.quantity, before.reward.claimed_count),
                "{}: reward counters changed",
                before.id()
            );
        }
        ensure!(back.origin == story.origin, "{}: origin changed", story.id());
    }
    Ok(())
}

fn clear_claims(ctx: &ScenarioCtx<'_>) -> Result<()> {
    let (store, mut engine) = fresh_engine(ctx)?;
    let target = claimable_step(&engine, ctx.now)?;
    engine.update_location(target.coordinates);
    engine.claim(target.id().as_str(), ctx.now)?;
    let counters = reward_counters(&engine);

    let cleared = engine.clear_claims()?;
    ensure!(cleared == 1, "expected one cleared claim, got {cleared}");
    ensure!(engine.claimed().is_empty(), "claims remain after clearing");
    ensure!(reward_counters(&engine) == counters, "clearing claims reset counters");

    let reloaded = QuestEngine::load(store, ctx.seed);
    ensure!(reloaded.claimed().is_empty(), "cleared claims came back on reload");
    ensure!(
        reward_counters(&reloaded) == counters,
        "reloaded counters differ from before the clear"
    );
    Ok(())
}
