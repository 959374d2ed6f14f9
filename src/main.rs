//! Pitwall CLI
//!
//! `decide` one scenario, `inspect` how it was decided, or `evaluate` the
//! engine against the golden and adversarial datasets.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::info;

use pitwall::agent::ProviderKind;
use pitwall::memory::{golden, EmbedderKind};
use pitwall::orchestrator::evaluator::load_adversarial;
use pitwall::orchestrator::{DecisionEngine, EvalCase, Evaluator, SummaryStore};
use pitwall::utils::{init_telemetry, truncate_text};
use pitwall::PitwallConfig;

#[derive(Parser)]
#[command(author, version, about = "Pit-stop strategy decisions", long_about = None)]
struct Cli {
    /// YAML config file
    #[arg(long, short, env = "PITWALL_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Reasoning provider (ollama, openai, none)
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Reasoning model name
    #[arg(long, global = true)]
    model: Option<String>,
    /// Scenario embedder (feature, hybrid)
    #[arg(long, global = true)]
    embedder: Option<String>,
    /// Prebuilt corpus snapshot
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,
    /// Golden dataset directory
    #[arg(long, global = true)]
    golden_dir: Option<PathBuf>,
    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide one scenario and print the decision as JSON
    Decide {
        /// Scenario JSON file; stdin when omitted or "-"
        scenario: Option<PathBuf>,
    },
    /// Decide one scenario and print every stage visited
    Inspect {
        /// Scenario JSON file; stdin when omitted or "-"
        scenario: Option<PathBuf>,
    },
    /// Run the golden datasets (plus any adversarial files) and write the results summary
    Evaluate {
        /// Adversarial case files
        #[arg(long = "adversarial", value_name = "FILE")]
        adversarial: Vec<PathBuf>,
        /// Where to write the summary
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Cases evaluated at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Also run a rules-only engine and report where the full pipeline differs
        #[arg(long)]
        compare: bool,
    },
    /// Check golden dataset files and list every problem found
    Validate {
        /// Dataset files; the golden directory when empty
        files: Vec<PathBuf>,
    },
}

impl Cli {
    fn resolve_config(&self) -> Result<PitwallConfig> {
        let mut config = PitwallConfig::load(self.config.as_deref())?;
        if let Some(p) = &self.provider {
            config.provider = ProviderKind::from_label(p)
                .with_context(|| format!("Unknown provider '{}'", p))?;
        }
        if let Some(m) = &self.model {
            config.model = m.clone();
        }
        if let Some(e) = &self.embedder {
            config.embedder = EmbedderKind::from_label(e)
                .with_context(|| format!("Unknown embedder '{}'", e))?;
        }
        if let Some(c) = &self.corpus {
            config.corpus_snapshot = Some(c.clone());
        }
        if let Some(d) = &self.golden_dir {
            config.golden_dir = d.clone();
        }
        config.check()?;
        Ok(config)
    }
}

async fn read_scenario(path: Option<&Path>) -> Result<serde_json::Value> {
    let content = match path.filter(|p| p.as_os_str() != "-") {
        Some(p) => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("Failed to read scenario {:?}", p))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read scenario from stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Scenario is not valid JSON")
}

fn print_error(e: &pitwall::StrategyError) -> Result<()> {
    let body = serde_json::json!({ "error": e.kind(), "message": e.to_string() });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(cli.verbose);
    let config = cli.resolve_config()?;

    match &cli.command {
        Commands::Decide { scenario } => {
            let value = read_scenario(scenario.as_deref()).await?;
            let engine = DecisionEngine::from_config(&config).await?;
            match engine.decide_json(&value).await {
                Ok(decision) => println!("{}", serde_json::to_string_pretty(&decision)?),
                Err(e) => {
                    print_error(&e)?;
                    std::process::exit(2);
                }
            }
        }
        Commands::Inspect { scenario } => {
            let value = read_scenario(scenario.as_deref()).await?;
            let engine = DecisionEngine::from_config(&config).await?;
            let scenario = match pitwall::race::parse_scenario(&value) {
                Ok(s) => s,
                Err(e) => {
                    print_error(&e)?;
                    std::process::exit(2);
                }
            };
            match engine.trace(scenario).await {
                Ok(trace) => {
                    println!("{}", serde_json::to_string_pretty(&trace)?);
                    for n in &trace.neighbors {
                        eprintln!(
                            "  {:<40} {:.3} {:<8} {}",
                            n.id,
                            n.similarity,
                            n.action.as_str(),
                            truncate_text(&n.rationale, 60)
                        );
                    }
                }
                Err(failed) => {
                    print_error(&failed.error)?;
                    eprintln!("  states: {:?}", failed.states);
                    std::process::exit(2);
                }
            }
        }
        Commands::Evaluate { adversarial, output, concurrency, compare } => {
            let engine = DecisionEngine::from_config(&config).await?;

            let mut cases: Vec<EvalCase> = golden::load_golden_dir(&config.golden_dir)
                .await?
                .into_iter()
                .map(EvalCase::from)
                .collect();
            for path in adversarial {
                cases.extend(load_adversarial(path).await?);
            }

            let concurrency = concurrency.unwrap_or(config.eval_concurrency);
            let baseline = compare
                .then(|| Evaluator::new(engine.clone().rules_only()).with_concurrency(concurrency));
            let evaluator = Evaluator::new(engine).with_concurrency(concurrency);
            let (summary, comparison) = match &baseline {
                Some(baseline) => {
                    let (summary, comparison) = evaluator.compare(baseline, cases).await;
                    (summary, Some(comparison))
                }
                None => (evaluator.run(cases).await, None),
            };

            let store = SummaryStore::new(output.clone().unwrap_or_else(|| config.results_path.clone()));
            store.save(&summary).await?;
            info!("Results summary written to {:?}", store.path());

            println!(
                "{}/{} passing ({:.1}%), {} failing, {} errored",
                summary.summary.passing,
                summary.summary.total,
                summary.summary.overall_accuracy * 100.0,
                summary.summary.failing,
                summary.summary.errored
            );
            for case in summary.failures() {
                println!(
                    "  FAIL {:<40} expected {:<16} got {}",
                    case.id, case.expected, case.actual
                );
            }

            if let Some(cmp) = comparison {
                println!(
                    "rules only {:.1}%, full pipeline {:.1}% ({:+.1} points)",
                    cmp.baseline.overall_accuracy * 100.0,
                    cmp.candidate.overall_accuracy * 100.0,
                    cmp.accuracy_delta * 100.0
                );
                for id in &cmp.regressions {
                    println!("  WORSE {}", id);
                }
                for id in &cmp.improvements {
                    println!("  BETTER {}", id);
                }
                for d in &cmp.disagreements {
                    println!(
                        "  DIFF {:<40} expected {:<9} rules {:<9} full {} ({:.0}%)",
                        d.id,
                        d.expected,
                        d.baseline,
                        d.candidate,
                        d.candidate_confidence.unwrap_or(0.0) * 100.0
                    );
                }
            }
        }
        Commands::Validate { files } => {
            let files = if files.is_empty() {
                golden::dataset_files(&config.golden_dir).await?
            } else {
                files.clone()
            };
            let mut problems = 0;
            for path in &files {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {:?}", path))?;
                let value: serde_json::Value = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {:?}", path))?;
                let errors = golden::validate_golden_dataset(&value);
                if errors.is_empty() {
                    println!("ok    {}", path.display());
                } else {
                    println!("FAIL  {} ({} problems)", path.display(), errors.len());
                    for e in &errors {
                        println!("      {}", e);
                    }
                }
                problems += errors.len();
            }
            if problems > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
