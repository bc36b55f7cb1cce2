//! CLI entrypoint for the tieralloc harness.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tieralloc_core::MallocStats;
use tieralloc_harness::runner::parse_fit_selection;
use tieralloc_harness::{HarnessError, ScenarioReport, Script, TestRunner};

/// Scenario and replay tooling for the tiered allocator.
#[derive(Debug, Parser)]
#[command(name = "tieralloc-harness")]
#[command(about = "Scenario and replay harness for the tiered allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the reference scenario catalogue against fresh allocators.
    Scenarios {
        /// Fit policy to exercise (`first`, `best`, or `both`).
        #[arg(long, default_value = "both")]
        fit: String,
        /// Report format (`md` or `json`).
        #[arg(long, default_value = "md")]
        format: String,
        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay an allocation script and print the final counters as JSON.
    Replay {
        /// Script path.
        #[arg(long)]
        script: PathBuf,
        /// Fit policy to replay under (`first`, `best`, or `both`).
        #[arg(long, default_value = "first")]
        fit: String,
        /// Print every step and snapshot, not only the final counters.
        #[arg(long)]
        verbose: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scenarios {
            fit,
            format,
            output,
        } => {
            let fits = parse_fit_selection(&fit)?;
            let runner = TestRunner::new("scenarios", fits.clone());
            let results = runner.run_catalogue();
            let report = ScenarioReport::new(
                "tieralloc scenario report",
                fits,
                format!("{:?}", std::time::SystemTime::now()),
                results,
            );
            let rendered = match format.as_str() {
                "md" | "markdown" => report.to_markdown(),
                "json" => report.to_json(),
                other => return Err(format!("unknown report format `{other}`").into()),
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    eprintln!("Report written to {}", path.display());
                }
                None => print!("{rendered}"),
            }
            eprintln!(
                "{} scenarios: {} passed, {} failed",
                report.summary.total, report.summary.passed, report.summary.failed
            );
            if report.summary.failed > 0 {
                return Err(HarnessError::ScenarioFailures {
                    failed: report.summary.failed,
                    total: report.summary.total,
                }
                .into());
            }
        }
        Command::Replay {
            script,
            fit,
            verbose,
        } => {
            let parsed = Script::from_file(&script)?;
            let mut outcomes = Vec::new();
            for fit in parse_fit_selection(&fit)? {
                outcomes.push(parsed.replay(fit)?);
            }
            match (outcomes.as_slice(), verbose) {
                ([single], true) => println!("{}", single.to_json()),
                ([single], false) => println!("{}", serde_json::to_string_pretty(&single.stats)?),
                (many, true) => println!("{}", serde_json::to_string_pretty(many)?),
                (many, false) => {
                    let by_fit: BTreeMap<&str, MallocStats> = many
                        .iter()
                        .map(|outcome| (outcome.fit.as_str(), outcome.stats))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&by_fit)?);
                }
            }
            if let Some(problem) = outcomes.iter().find_map(|o| o.integrity.as_deref()) {
                return Err(format!("heap structure check failed: {problem}").into());
            }
        }
    }

    Ok(())
}
