//! Pipeline Errors
//!
//! Every scenario ends in exactly one `Decision` or exactly one of these.

use std::time::Duration;
use thiserror::Error;

/// Typed failure for a single scenario's traversal of the decision pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StrategyError {
    /// Input did not match the published scenario shape.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid tire compound '{compound}' for regulation era {era}")]
    InvalidCompound { compound: String, era: String },

    #[error("impossible tire age: {age} laps on {compound} (allowed 0..={max})")]
    ImpossibleTireAge { compound: String, age: i64, max: u32 },

    #[error("lap out of range: {0}")]
    LapOutOfRange(String),

    /// The reasoning model answered, but not in a form we can act on.
    #[error("unparseable reasoning output: {0}")]
    UnparseableReasoning(String),

    #[error("reasoning timed out after {0:?}")]
    ReasoningTimeout(Duration),

    #[error("reasoning unavailable: {0}")]
    ReasoningUnavailable(String),

    #[error("corpus error: {0}")]
    Corpus(String),
}

impl StrategyError {
    /// Stable identifier used in evaluation tallies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StrategyError::Schema(_) => "SchemaError",
            StrategyError::InvalidCompound { .. } => "InvalidCompound",
            StrategyError::ImpossibleTireAge { .. } => "ImpossibleTireAge",
            StrategyError::LapOutOfRange(_) => "LapOutOfRange",
            StrategyError::UnparseableReasoning(_) => "UnparseableReasoning",
            StrategyError::ReasoningTimeout(_) => "ReasoningTimeout",
            StrategyError::ReasoningUnavailable(_) => "ReasoningUnavailable",
            StrategyError::Corpus(_) => "CorpusError",
        }
    }

    /// True for the errors raised before any decision stage runs.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StrategyError::Schema(_)
                | StrategyError::InvalidCompound { .. }
                | StrategyError::ImpossibleTireAge { .. }
                | StrategyError::LapOutOfRange(_)
        )
    }
}

pub type StrategyResult<T> = std::result::Result<T, StrategyError>;
