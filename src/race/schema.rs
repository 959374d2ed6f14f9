//! Scenario Input Schema
//!
//! Structural checks on an incoming JSON record. Runs before semantic
//! validation; anything that fails here is a `SchemaError`.

use serde::Deserialize;
use serde_json::Value;

use super::types::{Gaps, RegulationEra, Scenario, Weather};
use crate::error::{StrategyError, StrategyResult};

/// Required fields with the aliases accepted for each
pub const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("track", &[]),
    ("current_lap", &["lap"]),
    ("max_race_laps", &["total_laps"]),
    ("compound", &[]),
    ("tire_age", &["age_laps"]),
    ("weather", &[]),
    ("safety_car", &[]),
];

#[derive(Debug, Deserialize)]
struct WireScenario {
    #[serde(default)]
    id: Option<String>,
    track: String,
    #[serde(alias = "lap")]
    current_lap: i64,
    #[serde(alias = "total_laps")]
    max_race_laps: i64,
    #[serde(default)]
    regulation_era: Option<String>,
    compound: String,
    #[serde(alias = "age_laps")]
    tire_age: i64,
    #[serde(default)]
    gaps: Option<Gaps>,
    weather: String,
    safety_car: bool,
    #[serde(default)]
    virtual_safety_car: bool,
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    description: Option<String>,
}

/// Names of required fields absent (or null) in `value`
pub fn missing_fields(value: &Value) -> Vec<&'static str> {
    let Some(obj) = value.as_object() else {
        return REQUIRED_FIELDS.iter().map(|(name, _)| *name).collect();
    };

    REQUIRED_FIELDS
        .iter()
        .filter(|(name, aliases)| {
            let present = |key: &str| obj.get(key).map_or(false, |v| !v.is_null());
            !present(name) && !aliases.iter().any(|a| present(a))
        })
        .map(|(name, _)| *name)
        .collect()
}

/// Parse a scenario record, reporting every missing field at once.
pub fn parse_scenario(value: &Value) -> StrategyResult<Scenario> {
    if !value.is_object() {
        return Err(StrategyError::Schema("scenario must be a JSON object".to_string()));
    }

    let missing = missing_fields(value);
    if !missing.is_empty() {
        return Err(StrategyError::Schema(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }

    let wire: WireScenario = serde_json::from_value(value.clone())
        .map_err(|e| StrategyError::Schema(e.to_string()))?;

    let weather = Weather::from_label(&wire.weather)
        .ok_or_else(|| StrategyError::Schema(format!("unknown weather '{}'", wire.weather)))?;

    let regulation_era = match wire.regulation_era.as_deref() {
        None => RegulationEra::default(),
        Some(label) => RegulationEra::from_label(label)
            .ok_or_else(|| StrategyError::Schema(format!("unknown regulation era '{}'", label)))?,
    };

    Ok(Scenario {
        id: wire.id,
        track: wire.track,
        current_lap: wire.current_lap,
        max_race_laps: wire.max_race_laps,
        regulation_era,
        compound: wire.compound,
        tire_age: wire.tire_age,
        gaps: wire.gaps.unwrap_or_default(),
        weather,
        safety_car: wire.safety_car,
        virtual_safety_car: wire.virtual_safety_car,
        driver: wire.driver,
        position: wire.position,
        description: wire.description,
    })
}
