//! Scenario Memory Module
//!
//! Embeds scenarios, holds the labelled golden corpus and answers
//! nearest-neighbour consensus queries against it.

pub mod embed;
pub mod entry;
pub mod corpus;
pub mod golden;
pub mod retriever;

pub use embed::{EmbedderKind, FeatureEmbedder, HybridEmbedder, ScenarioEmbedder};
pub use entry::{CorpusEntry, Neighbor};
pub use corpus::ScenarioCorpus;
pub use golden::{GoldenCase, GoldenDataset};
pub use retriever::{ConsensusRetriever, RetrievalOutcome, RetrieverConfig, Tally};
