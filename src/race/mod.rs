//! Race Data Model
//!
//! Scenarios, compounds, weather, regulation eras, track profiles and the
//! input schema that turns raw JSON into a `Scenario`.

pub mod types;
pub mod track;
pub mod schema;

pub use types::{
    Action, Decision, DecisionSource, Gaps, RacePhase, RegulationEra, Scenario, TireCompound,
    Weather,
};
pub use track::TrackProfile;
pub use schema::parse_scenario;
