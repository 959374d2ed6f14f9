//! Scenario Corpus
//!
//! Labelled, pre-embedded historical scenarios. Built offline (or at start
//! from the golden directory), then shared read-only for the process lifetime.
//! Snapshots are zstd-compressed bincode.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::embed::ScenarioEmbedder;
use super::entry::CorpusEntry;
use super::golden::GoldenCase;
use crate::error::{StrategyError, StrategyResult};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CorpusSnapshot {
    version: u32,
    embedder: String,
    dimension: usize,
    entries: Vec<CorpusEntry>,
}

#[derive(Debug, Clone)]
pub struct ScenarioCorpus {
    embedder: String,
    dimension: usize,
    entries: Arc<Vec<CorpusEntry>>,
}

impl ScenarioCorpus {
    pub fn empty(embedder: impl Into<String>, dimension: usize) -> Self {
        Self {
            embedder: embedder.into(),
            dimension,
            entries: Arc::new(Vec::new()),
        }
    }

    /// Entries keep their insertion order; every embedding must have `dimension` values.
    pub fn from_entries(
        embedder: impl Into<String>,
        dimension: usize,
        entries: Vec<CorpusEntry>,
    ) -> StrategyResult<Self> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            return Err(StrategyError::Corpus(format!(
                "entry '{}' has {} dims, corpus expects {}",
                bad.id,
                bad.embedding.len(),
                dimension
            )));
        }
        Ok(Self {
            embedder: embedder.into(),
            dimension,
            entries: Arc::new(entries),
        })
    }

    /// Embed golden cases into a fresh corpus
    pub fn build(cases: &[GoldenCase], embedder: &dyn ScenarioEmbedder) -> Result<Self> {
        let scenarios: Vec<_> = cases.iter().map(|c| c.scenario.clone()).collect();
        let embeddings = embedder
            .embed_batch(&scenarios)
            .context("Failed to embed golden scenarios")?;

        let entries = cases
            .iter()
            .zip(embeddings)
            .map(|(case, embedding)| {
                CorpusEntry::new(
                    case.id.clone(),
                    case.scenario.clone(),
                    case.expected,
                    case.rationale.clone(),
                    embedding,
                )
                .with_dataset(case.dataset.clone())
            })
            .collect();

        let corpus = Self::from_entries(embedder.name(), embedder.dimension(), entries)?;
        info!(
            "Built corpus of {} scenarios with {} embedder ({} dims)",
            corpus.len(),
            corpus.embedder,
            corpus.dimension
        );
        Ok(corpus)
    }

    pub async fn load_snapshot(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = tokio::task::spawn_blocking({
            let path = path.clone();
            move || {
                let file = File::open(&path)?;
                let decoder = zstd::stream::read::Decoder::new(BufReader::new(file))?;
                let snapshot: CorpusSnapshot = bincode::deserialize_from(decoder)?;
                Ok::<_, anyhow::Error>(snapshot)
            }
        })
        .await?
        .with_context(|| format!("Failed to load corpus snapshot {:?}", path))?;

        if snapshot.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "Corpus snapshot {:?} has version {}, expected {}",
                path,
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }

        let corpus = Self::from_entries(snapshot.embedder, snapshot.dimension, snapshot.entries)?;
        info!("Loaded {} corpus entries from {:?}", corpus.len(), path);
        Ok(corpus)
    }

    pub async fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let snapshot = CorpusSnapshot {
            version: SNAPSHOT_VERSION,
            embedder: self.embedder.clone(),
            dimension: self.dimension,
            entries: self.entries.as_ref().clone(),
        };

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(&path)?;
            let writer = BufWriter::new(file);
            let mut encoder = zstd::stream::write::Encoder::new(writer, 3)?;
            bincode::serialize_into(&mut encoder, &snapshot)?;
            encoder.finish()?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Name of the embedder that produced the stored vectors
    pub fn embedder_name(&self) -> &str {
        &self.embedder
    }

    pub fn tracks(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.track.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&CorpusEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embed::FeatureEmbedder;
    use crate::race::{Action, Scenario, Weather};
    use tempfile::tempdir;

    fn case(id: &str, lap: i64, age: i64, expected: Action) -> GoldenCase {
        GoldenCase {
            id: id.to_string(),
            dataset: "test".to_string(),
            scenario: Scenario::new("Silverstone", lap, 52, "MEDIUM", age, Weather::Dry)
                .with_id(id),
            expected,
            rationale: format!("{} rationale", id),
        }
    }

    #[test]
    fn test_build_preserves_order() {
        let cases = vec![
            case("a", 10, 8, Action::StayOut),
            case("b", 30, 25, Action::Box),
            case("c", 20, 15, Action::StayOut),
        ];
        let corpus = ScenarioCorpus::build(&cases, &FeatureEmbedder).unwrap();
        let ids: Vec<_> = corpus.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(corpus.embedder_name(), "feature");
        assert_eq!(corpus.get("b").map(|e| e.action), Some(Action::Box));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let entry = CorpusEntry::new(
            "x",
            Scenario::new("Monza", 5, 53, "SOFT", 4, Weather::Dry),
            Action::StayOut,
            "",
            vec![1.0, 0.0],
        );
        let err = ScenarioCorpus::from_entries("feature", 11, vec![entry]).unwrap_err();
        assert_eq!(err.kind(), "CorpusError");
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("corpus/golden.bin.zst");
        let cases = vec![case("a", 10, 8, Action::StayOut), case("b", 30, 25, Action::Box)];
        let corpus = ScenarioCorpus::build(&cases, &FeatureEmbedder)?;

        corpus.persist(&path).await?;
        assert!(path.exists());

        let loaded = ScenarioCorpus::load_snapshot(&path).await?;
        assert_eq!(loaded.entries(), corpus.entries());
        assert_eq!(loaded.dimension(), corpus.dimension());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_snapshot_errors() {
        let dir = tempdir().unwrap();
        assert!(ScenarioCorpus::load_snapshot(dir.path().join("nope.bin")).await.is_err());
    }
}
