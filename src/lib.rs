//! Pitwall
//!
//! Pit-stop strategy decisions for a single race snapshot:
//! - Validation of the scenario against regulation-era compounds and race bounds
//! - A fixed rule ladder for the clear-cut calls
//! - Nearest-neighbour consensus over a labelled corpus of historical calls
//! - A language-model fallback for what neither can settle

pub mod agent;
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod race;
pub mod safety;
pub mod utils;

// Re-exports for convenience
pub use config::PitwallConfig;
pub use error::{StrategyError, StrategyResult};
pub use orchestrator::{DecisionEngine, Evaluator};
pub use race::{Action, Decision, DecisionSource, Scenario};
