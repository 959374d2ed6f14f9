//! Orchestrator Module
//!
//! Composes the decision stages into the engine and runs labelled cases
//! through it for evaluation.

pub mod rules;
pub mod engine;
pub mod evaluator;
pub mod summary;

pub use rules::{RuleConfidence, RuleLadder, RuleSpec, STANDARD_RULES};
pub use engine::{DecisionEngine, DecisionTrace, EngineState, FailedRun};
pub use evaluator::{CaseInput, CaseResult, Comparison, Disagreement, EvalCase, Evaluator, Expected, ResultsSummary};
pub use summary::SummaryStore;
