//! Safety Module
//!
//! Guardrails in front of the decision stages: rejects malformed or
//! physically impossible scenarios and flags dangerous tire choices.

pub mod compatibility;

pub use compatibility::{Compatibility, HazardSeverity};

use tracing::warn;

use crate::error::{StrategyError, StrategyResult};
use crate::race::{RegulationEra, Scenario, TireCompound};

/// Longest race distance we accept (Monaco is 78)
pub const MAX_RACE_LAPS: i64 = 80;

/// A scenario that passed every structural and physical check.
///
/// Only the validator can build one, so decision stages never see
/// unchecked input.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedScenario {
    scenario: Scenario,
    compound: TireCompound,
    compatibility: Compatibility,
}

impl ValidatedScenario {
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn compound(&self) -> TireCompound {
        self.compound
    }

    pub fn compatibility(&self) -> Compatibility {
        self.compatibility
    }

    /// Validated tire age (never negative)
    pub fn tire_age(&self) -> u32 {
        self.scenario.tire_age as u32
    }

    pub fn laps_remaining(&self) -> u32 {
        self.scenario.laps_remaining() as u32
    }

    pub fn into_inner(self) -> Scenario {
        self.scenario
    }
}

/// Semantic validator for race scenarios
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioValidator;

impl ScenarioValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a scenario, failing on the first violation.
    pub fn validate(&self, scenario: Scenario) -> StrategyResult<ValidatedScenario> {
        let compound = check_compound(&scenario.compound, scenario.regulation_era)?;
        check_tire_age(compound, scenario.tire_age)?;
        check_laps(scenario.current_lap, scenario.max_race_laps)?;

        let compatibility = compatibility::assess(compound, scenario.weather);
        if let Compatibility::Hazard(severity) = compatibility {
            warn!(
                "Scenario {}: {} on {} track flagged as {:?} hazard",
                scenario.label(),
                compound,
                scenario.weather.as_str(),
                severity
            );
        }

        Ok(ValidatedScenario { scenario, compound, compatibility })
    }

    /// Every violation in the scenario, for reporting. Empty means valid.
    pub fn audit(&self, scenario: &Scenario) -> Vec<StrategyError> {
        let mut errors = Vec::new();
        match check_compound(&scenario.compound, scenario.regulation_era) {
            Ok(compound) => {
                if let Err(e) = check_tire_age(compound, scenario.tire_age) {
                    errors.push(e);
                }
            }
            Err(e) => {
                errors.push(e);
                if scenario.tire_age < 0 {
                    errors.push(StrategyError::ImpossibleTireAge {
                        compound: scenario.compound.clone(),
                        age: scenario.tire_age,
                        max: 0,
                    });
                }
            }
        }
        if let Err(e) = check_laps(scenario.current_lap, scenario.max_race_laps) {
            errors.push(e);
        }
        errors
    }
}

fn check_compound(label: &str, era: RegulationEra) -> StrategyResult<TireCompound> {
    TireCompound::from_label(label)
        .filter(|c| era.allows(*c))
        .ok_or_else(|| StrategyError::InvalidCompound {
            compound: label.to_string(),
            era: era.to_string(),
        })
}

fn check_tire_age(compound: TireCompound, age: i64) -> StrategyResult<()> {
    let max = compound.max_age();
    if age < 0 || age > max as i64 {
        return Err(StrategyError::ImpossibleTireAge {
            compound: compound.to_string(),
            age,
            max,
        });
    }
    Ok(())
}

fn check_laps(current_lap: i64, max_race_laps: i64) -> StrategyResult<()> {
    if max_race_laps < 1 || max_race_laps > MAX_RACE_LAPS {
        return Err(StrategyError::LapOutOfRange(format!(
            "race distance {} outside 1..={}",
            max_race_laps, MAX_RACE_LAPS
        )));
    }
    if current_lap < 1 || current_lap > max_race_laps {
        return Err(StrategyError::LapOutOfRange(format!(
            "lap {} outside 1..={}",
            current_lap, max_race_laps
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::Weather;

    fn dry(compound: &str, lap: i64, age: i64) -> Scenario {
        Scenario::new("Silverstone", lap, 52, compound, age, Weather::Dry)
    }

    #[test]
    fn test_valid_scenario_passes() {
        let v = ScenarioValidator::new().validate(dry("SOFT", 1, 0)).unwrap();
        assert_eq!(v.compound(), TireCompound::Soft);
        assert_eq!(v.compatibility(), Compatibility::Optimal);
    }

    #[test]
    fn test_fictional_compound_rejected() {
        let err = ScenarioValidator::new().validate(dry("HYPERSOFT", 10, 3)).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidCompound { .. }));
        let err = ScenarioValidator::new().validate(dry("ROCKET", 10, 3)).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidCompound { .. }));
    }

    #[test]
    fn test_retired_compound_valid_in_its_era() {
        let s = dry("HYPERSOFT", 10, 3).with_era(RegulationEra::Era2014);
        assert!(ScenarioValidator::new().validate(s).is_ok());
    }

    #[test]
    fn test_tire_age_bounds() {
        let v = ScenarioValidator::new();
        assert!(matches!(
            v.validate(dry("SOFT", 10, -1)),
            Err(StrategyError::ImpossibleTireAge { .. })
        ));
        assert!(matches!(
            v.validate(dry("SOFT", 45, 41)),
            Err(StrategyError::ImpossibleTireAge { max: 40, .. })
        ));
        assert!(v.validate(dry("SOFT", 45, 40)).is_ok());
    }

    #[test]
    fn test_lap_bounds() {
        let v = ScenarioValidator::new();
        assert!(matches!(v.validate(dry("HARD", 0, 0)), Err(StrategyError::LapOutOfRange(_))));
        assert!(matches!(v.validate(dry("HARD", 53, 10)), Err(StrategyError::LapOutOfRange(_))));
        let too_long = Scenario::new("Endurance", 5, 120, "HARD", 5, Weather::Dry);
        assert!(matches!(v.validate(too_long), Err(StrategyError::LapOutOfRange(_))));
    }

    #[test]
    fn test_hazard_is_flagged_not_rejected() {
        let s = Scenario::new("Spa", 12, 44, "SOFT", 8, Weather::HeavyRain);
        let v = ScenarioValidator::new().validate(s).unwrap();
        assert_eq!(v.compatibility(), Compatibility::Hazard(HazardSeverity::Extreme));
    }

    #[test]
    fn test_audit_collects_all_violations() {
        let s = Scenario::new("Monza", 90, 53, "BANANA", -3, Weather::Dry);
        let errors = ScenarioValidator::new().audit(&s);
        let kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["InvalidCompound", "ImpossibleTireAge", "LapOutOfRange"]);
    }
}
