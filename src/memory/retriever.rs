//! Consensus Retriever
//!
//! Nearest-neighbour vote over the corpus. Returns a decision only when the
//! top-k labels agree strongly enough; the neighbours are always returned so
//! the reasoning stage can use them as examples.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::corpus::ScenarioCorpus;
use super::embed::{cosine_similarity, ScenarioEmbedder};
use super::entry::Neighbor;
use crate::error::{StrategyError, StrategyResult};
use crate::race::{Action, Decision, DecisionSource, Scenario};

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    pub top_k: usize,
    /// Minimum fraction of neighbours that must share the majority action
    pub consensus_threshold: f32,
    /// Confidence at exactly the threshold
    pub confidence_floor: f32,
    /// Confidence at unanimity
    pub confidence_ceiling: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            consensus_threshold: 0.80,
            confidence_floor: 0.65,
            confidence_ceiling: 0.85,
        }
    }
}

impl RetrieverConfig {
    /// Linear map of an agreement fraction in [threshold, 1.0] onto [floor, ceiling]
    pub fn calibrate(&self, agreement: f32) -> f32 {
        let span = 1.0 - self.consensus_threshold;
        if span <= EPSILON {
            return self.confidence_ceiling;
        }
        let t = ((agreement - self.consensus_threshold) / span).clamp(0.0, 1.0);
        self.confidence_floor + t * (self.confidence_ceiling - self.confidence_floor)
    }
}

/// Vote tally over the neighbour labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub boxes: usize,
    pub stay_outs: usize,
}

impl Tally {
    pub fn of(neighbors: &[Neighbor]) -> Self {
        let boxes = neighbors.iter().filter(|n| n.action == Action::Box).count();
        Self { boxes, stay_outs: neighbors.len() - boxes }
    }

    pub fn total(&self) -> usize {
        self.boxes + self.stay_outs
    }

    /// Majority action and its share; `None` on an empty or exactly split vote
    pub fn majority(&self) -> Option<(Action, f32)> {
        let total = self.total();
        if total == 0 || self.boxes == self.stay_outs {
            return None;
        }
        let (action, votes) = if self.boxes > self.stay_outs {
            (Action::Box, self.boxes)
        } else {
            (Action::StayOut, self.stay_outs)
        };
        Some((action, votes as f32 / total as f32))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub decision: Option<Decision>,
    pub neighbors: Vec<Neighbor>,
    pub tally: Tally,
}

#[derive(Clone)]
pub struct ConsensusRetriever {
    embedder: Arc<dyn ScenarioEmbedder>,
    corpus: ScenarioCorpus,
    config: RetrieverConfig,
}

impl ConsensusRetriever {
    pub fn new(embedder: Arc<dyn ScenarioEmbedder>, corpus: ScenarioCorpus) -> Self {
        Self::with_config(embedder, corpus, RetrieverConfig::default())
    }

    pub fn with_config(
        embedder: Arc<dyn ScenarioEmbedder>,
        corpus: ScenarioCorpus,
        config: RetrieverConfig,
    ) -> Self {
        Self { embedder, corpus, config }
    }

    pub fn corpus(&self) -> &ScenarioCorpus {
        &self.corpus
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Top-k neighbours by cosine similarity; ties keep corpus order.
    pub fn nearest(&self, scenario: &Scenario) -> StrategyResult<Vec<Neighbor>> {
        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let query = self
            .embedder
            .embed(scenario)
            .map_err(|e| StrategyError::Corpus(format!("embedding failed: {}", e)))?;
        if query.len() != self.corpus.dimension() {
            return Err(StrategyError::Corpus(format!(
                "query has {} dims, corpus '{}' has {}",
                query.len(),
                self.corpus.embedder_name(),
                self.corpus.dimension()
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .corpus
            .entries()
            .par_iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(&query, &e.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let entries = self.corpus.entries();
        Ok(scored
            .into_iter()
            .take(self.config.top_k)
            .map(|(i, sim)| Neighbor::from_entry(&entries[i], sim))
            .collect())
    }

    pub fn retrieve(&self, scenario: &Scenario) -> StrategyResult<RetrievalOutcome> {
        let neighbors = self.nearest(scenario)?;
        let tally = Tally::of(&neighbors);

        let decision = match tally.majority() {
            Some((action, agreement))
                if agreement + EPSILON >= self.config.consensus_threshold =>
            {
                let confidence = self.config.calibrate(agreement);
                let examples = neighbors
                    .iter()
                    .filter(|n| n.action == action)
                    .map(|n| n.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(Decision::new(
                    action,
                    confidence,
                    format!(
                        "{} of {} similar historical scenarios chose {} ({}).",
                        match action {
                            Action::Box => tally.boxes,
                            Action::StayOut => tally.stay_outs,
                        },
                        tally.total(),
                        action,
                        examples
                    ),
                    DecisionSource::Retrieval,
                ))
            }
            Some((action, agreement)) => {
                debug!(
                    "No consensus for {}: {} at {:.2} below {:.2}",
                    scenario.label(),
                    action,
                    agreement,
                    self.config.consensus_threshold
                );
                None
            }
            None => {
                debug!("No majority for {} ({} neighbours)", scenario.label(), neighbors.len());
                None
            }
        };

        Ok(RetrievalOutcome { decision, neighbors, tally })
    }
}
