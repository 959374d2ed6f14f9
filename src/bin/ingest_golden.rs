use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use pitwall::memory::{golden, EmbedderKind, ScenarioCorpus};
use pitwall::utils::init_telemetry;
use pitwall::PitwallConfig;

/// Embed the golden datasets into a corpus snapshot
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file
    #[arg(long, short, env = "PITWALL_CONFIG")]
    config: Option<PathBuf>,
    /// Golden dataset directory
    #[arg(long)]
    golden_dir: Option<PathBuf>,
    /// Scenario embedder (feature, hybrid)
    #[arg(long)]
    embedder: Option<String>,
    /// Snapshot to write
    #[arg(long, short, default_value = "data/corpus.bin.zst")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_telemetry(false);
    let args = Args::parse();

    let config = PitwallConfig::load(args.config.as_deref())?;
    let golden_dir = args.golden_dir.unwrap_or(config.golden_dir);
    let kind = match &args.embedder {
        Some(label) => EmbedderKind::from_label(label)
            .with_context(|| format!("Unknown embedder '{}'", label))?,
        None => config.embedder,
    };

    let files = golden::dataset_files(&golden_dir).await?;
    if files.is_empty() {
        anyhow::bail!("No golden datasets found in {:?}", golden_dir);
    }
    info!("Ingesting {} datasets from {:?}", files.len(), golden_dir);

    let mut cases = Vec::new();
    for path in &files {
        match golden::load_dataset(path).await {
            Ok(dataset) => {
                let name = golden::dataset_name(path);
                let loaded = dataset.cases(&name)?;
                info!("{}: {} scenarios", name, loaded.len());
                cases.extend(loaded);
            }
            Err(e) => warn!("Skipping {:?}: {:#}", path, e),
        }
    }

    info!("Embedding {} scenarios with the {} embedder", cases.len(), kind.as_str());
    let embedder = kind.build()?;
    let corpus = tokio::task::spawn_blocking(move || ScenarioCorpus::build(&cases, embedder.as_ref()))
        .await??;

    corpus.persist(&args.output).await?;
    info!(
        "Ingestion complete. {} entries across {} tracks written to {:?}",
        corpus.len(),
        corpus.tracks().len(),
        args.output
    );

    Ok(())
}
