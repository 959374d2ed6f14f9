//! Corpus Entry types

use serde::{Deserialize, Serialize};

use crate::race::{Action, Scenario};

/// A labelled historical scenario with its precomputed embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusEntry {
    /// Unique identifier (golden scenario id)
    pub id: String,
    pub track: String,
    /// Golden dataset the entry was ingested from
    pub dataset: String,
    pub scenario: Scenario,
    /// Ground-truth call made in the real race
    pub action: Action,
    pub rationale: String,
    pub embedding: Vec<f32>,
}

impl CorpusEntry {
    pub fn new(
        id: impl Into<String>,
        scenario: Scenario,
        action: Action,
        rationale: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            track: scenario.track.clone(),
            dataset: String::new(),
            scenario,
            action,
            rationale: rationale.into(),
            embedding,
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }
}

/// A corpus entry scored against a query, as returned by the retriever
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub track: String,
    pub similarity: f32,
    pub action: Action,
    pub rationale: String,
    pub scenario: Scenario,
}

impl Neighbor {
    pub fn from_entry(entry: &CorpusEntry, similarity: f32) -> Self {
        Self {
            id: entry.id.clone(),
            track: entry.track.clone(),
            similarity,
            action: entry.action,
            rationale: entry.rationale.clone(),
            scenario: entry.scenario.clone(),
        }
    }
}
