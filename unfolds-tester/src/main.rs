mod loader;
mod reports;
mod runner;
mod scenarios;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;
use unfolds_engine::{StoryLoader, format_timestamp};

use loader::StoryFiles;
use runner::{RunSettings, ScenarioResult, ScenarioRunner};
use scenarios::{expand_scenarios, get_scenario, list_scenarios};
use util::{parse_location, parse_seeds, resolve_now, split_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Console,
    Json,
    Markdown,
}

#[derive(Debug, Parser)]
#[command(name = "unfolds-tester", version = "0.3.0")]
#[command(
    about = "Scenario checks for the Unfolds quest engine against bundled or local story files"
)]
struct Args {
    /// Scenarios to run (comma-separated, `all` for the whole catalog)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Story files to load instead of the bundled ones (repeatable)
    #[arg(long = "story")]
    stories: Vec<PathBuf>,

    /// Explorer location as `lat,lng`
    #[arg(long, value_parser = parse_location)]
    at: Option<unfolds_engine::Coordinate>,

    /// Evaluation instant (RFC 3339 or `YYYY-MM-DDTHH:MM`); defaults to now
    #[arg(long)]
    now: Option<String>,

    /// Reward-code seeds (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let stories = load_stories(&args)?;
    let now = resolve_now(args.now.as_deref())?;
    let seeds = parse_seeds(&split_csv(&args.seeds))?;
    let settings = RunSettings {
        stories: &stories,
        now,
        at: args.at,
        iterations: args.iterations,
    };
    println!("🕒 Evaluating at {}", format_timestamp(now).bright_white());

    let results = run_scenarios(&args, &seeds, &settings);
    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:20} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🧭 Unfolds Scenario Tester".bright_cyan().bold());
    println!("{}", "==========================".cyan());
}

fn load_stories(args: &Args) -> Result<StoryFiles> {
    let stories = if args.stories.is_empty() {
        StoryFiles::bundled()
    } else {
        StoryFiles::read(&args.stories)?
    };
    let docs = stories
        .load_documents()
        .context("story files failed validation")?;
    if args.verbose {
        for source in stories.sources() {
            println!("📄 {}", source.bright_white());
        }
    }
    println!("📚 {} story documents loaded", docs.len());
    Ok(stories)
}

fn run_scenarios(args: &Args, seeds: &[u64], settings: &RunSettings<'_>) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let runner = ScenarioRunner::new(args.verbose);
    let mut results = Vec::new();
    for key in expand_scenarios(&split_csv(&args.scenarios)) {
        let Some(scenario) = get_scenario(&key) else {
            eprintln!("⚠️  Unknown scenario: {}", key.yellow());
            continue;
        };
        results.extend(runner.run_scenario(scenario, seeds, settings));
    }
    results
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report {
        ReportFormat::Json => reports::generate_json_report(&mut output_target, results)?,
        ReportFormat::Markdown => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Unfolds Scenario Results\n\n_No scenarios executed._"
                )?;
            } else {
                reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        ReportFormat::Console => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(
                &mut output_target,
                "🏁 Total time: {:?}",
                start_time.elapsed()
            )?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            stories: Vec::new(),
            at: None,
            now: Some("2024-06-15T12:00:00Z".to_string()),
            seeds: "1337".to_string(),
            iterations: 1,
            report: ReportFormat::Json,
            verbose: false,
            output: None,
        }
    }

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "unfolds-main-{label}-{}",
            std::process::id()
        ))
    }

    #[test]
    fn args_parse_location_and_format() {
        let args = Args::parse_from([
            "unfolds-tester",
            "--at",
            "40.7128,-74.0060",
            "--report",
            "markdown",
            "--scenarios",
            "smoke,claim-flow",
        ]);
        assert_eq!(args.report, ReportFormat::Markdown);
        assert!(args.at.is_some());
        assert_eq!(split_csv(&args.scenarios).len(), 2);
    }

    #[test]
    fn args_reject_bad_location() {
        assert!(Args::try_parse_from(["unfolds-tester", "--at", "nowhere"]).is_err());
    }

    #[test]
    fn list_scenarios_writes_to_file() {
        let path = temp_path("list");
        let mut args = base_args();
        args.list_scenarios = true;
        args.output = Some(path.clone());
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("claim-flow"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unknown_scenarios_are_skipped() {
        let mut args = base_args();
        args.scenarios = "nope".to_string();
        let stories = StoryFiles::bundled();
        let settings = RunSettings {
            stories: &stories,
            now: resolve_now(args.now.as_deref()).unwrap(),
            at: None,
            iterations: 1,
        };
        assert!(run_scenarios(&args, &[1], &settings).is_empty());
    }

    #[test]
    fn markdown_without_results_says_so() {
        let path = temp_path("md");
        let mut args = base_args();
        args.report = ReportFormat::Markdown;
        args.output = Some(path.clone());
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("_No scenarios executed._"));
        let _ = std::fs::remove_file(path);
    }
}
