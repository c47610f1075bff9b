mod harness;
mod reports;
mod runner;
mod scenarios;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use harness::TesterAssets;
use runner::{ScenarioResult, ScenarioRunner};
use scenarios::{all_scenarios, get_scenario, list_scenarios};
use util::{parse_seeds, split_csv};

#[derive(Debug, Parser)]
#[command(name = "taskforge-tester", version = "0.1.0")]
#[command(about = "Automated scenario runner for the TaskForge progression engine")]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated, decimal or 0x-prefixed hex)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Role catalog JSON to use instead of the bundled one
    #[arg(long)]
    roles: Option<PathBuf>,

    /// Engine configuration JSON to use instead of the defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let assets = TesterAssets::load(args.roles.as_deref(), args.config.as_deref())?;
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = parse_seeds(&split_csv(&args.seeds))?;
    anyhow::ensure!(!seeds.is_empty(), "no seeds given");

    let results = run_scenarios(&args, &assets, &scenarios, &seeds).await;

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:15} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "⚒️  TaskForge Scenario Tester".bright_cyan().bold());
    println!("{}", "============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s.eq_ignore_ascii_case("all")) {
        scenarios = all_scenarios()
            .iter()
            .map(|scenario| scenario.name().to_string())
            .collect();
    }
    scenarios
}

async fn run_scenarios(
    args: &Args,
    assets: &TesterAssets,
    scenarios: &[String],
    seeds: &[u64],
) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let runner = ScenarioRunner::new(assets, args.verbose);
    let mut results = Vec::new();
    for scenario_name in scenarios {
        let Some(scenario) = get_scenario(scenario_name) else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
            continue;
        };
        results.extend(
            runner
                .run_scenario(scenario.as_ref(), seeds, args.iterations)
                .await,
        );
    }
    results
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report.as_str() {
        "json" => reports::generate_json_report(&mut output_target, results)?,
        "markdown" => reports::generate_markdown_report(&mut output_target, results)?,
        _ => {
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
            writeln!(&mut output_target, "🏁 Total time: {:?}", start_time.elapsed())?;
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
            seeds: "1337".to_string(),
            iterations: 1,
            report: "json".to_string(),
            verbose: false,
            output: None,
            roles: None,
            config: None,
        }
    }

    #[test]
    fn expand_all_lists_every_scenario() {
        let expanded = expand_scenarios("all");
        assert_eq!(expanded.len(), list_scenarios().len());
        assert!(expanded.contains(&"soak".to_string()));
        assert_eq!(expand_scenarios("smoke, salary"), vec!["smoke", "salary"]);
    }

    #[test]
    fn args_parse_report_and_paths() {
        let args = Args::parse_from([
            "taskforge-tester",
            "--scenarios",
            "leveling",
            "--report",
            "markdown",
            "--roles",
            "custom.json",
            "-v",
        ]);
        assert_eq!(args.scenarios, "leveling");
        assert_eq!(args.report, "markdown");
        assert_eq!(args.roles, Some(PathBuf::from("custom.json")));
        assert!(args.verbose);
        assert_eq!(args.iterations, 10);
        assert!(Args::try_parse_from(["taskforge-tester", "--report", "csv"]).is_err());
    }

    #[tokio::test]
    async fn unknown_scenarios_are_skipped() {
        let args = base_args();
        let assets = TesterAssets::load(None, None).unwrap();
        let results = run_scenarios(
            &args,
            &assets,
            &["missing".to_string(), "smoke".to_string()],
            &[1, 2],
        )
        .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed && r.scenario_name == "smoke"));
    }

    #[test]
    fn reports_write_to_the_output_file() {
        let path = std::env::temp_dir().join(format!(
            "taskforge-report-{}.json",
            std::process::id()
        ));
        let mut args = base_args();
        args.output = Some(path.clone());
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"total\": 0"));
        let _ = std::fs::remove_file(path);
    }
}
