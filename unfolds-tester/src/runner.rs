use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use unfolds_engine::{Coordinate, Timestamp};

use crate::loader::StoryFiles;
use crate::scenarios::{Scenario, ScenarioCtx};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
}

/// Shared inputs for every scenario run.
pub struct RunSettings<'a> {
    pub stories: &'a StoryFiles,
    pub now: Timestamp,
    pub at: Option<Coordinate>,
    pub iterations: usize,
}

pub struct ScenarioRunner {
    verbose: bool,
}

impl ScenarioRunner {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn run_scenario(
        &self,
        scenario: &Scenario,
        seeds: &[u64],
        settings: &RunSettings<'_>,
    ) -> Vec<ScenarioResult> {
        seeds
            .iter()
            .map(|&seed| {
                if self.verbose {
                    println!(
                        "🧪 Testing scenario: {} (seed: {seed})",
                        scenario.name.bright_white()
                    );
                }
                self.run_single(scenario, seed, settings)
            })
            .collect()
    }

    fn run_single(
        &self,
        scenario: &Scenario,
        seed: u64,
        settings: &RunSettings<'_>,
    ) -> ScenarioResult {
        let ctx = ScenarioCtx {
            stories: settings.stories,
            seed,
            now: settings.now,
            at: settings.at,
            verbose: self.verbose,
        };
        let iterations = settings.iterations.max(1);
        let mut failures = Vec::new();
        let mut durations = Vec::with_capacity(iterations);

        for iteration in 0..iterations {
            let started = Instant::now();
            let outcome = scenario.run(&ctx);
            durations.push(started.elapsed());
            if let Err(err) = outcome {
                log::debug!("{} iteration {iteration} failed: {err:?}", scenario.key);
                failures.push(format!("iteration {}: {err:#}", iteration + 1));
            }
        }

        let total: Duration = durations.iter().sum();
        let average_duration = total / u32::try_from(iterations).unwrap_or(u32::MAX);
        ScenarioResult {
            scenario_name: scenario.name.to_string(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: iterations - failures.len(),
            failures,
            average_duration,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}
