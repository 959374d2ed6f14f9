//! Rule Ladder - deterministic fast paths
//!
//! An ordered slice of predicate/decision pairs evaluated top to bottom.
//! The first matching rule wins; no match hands control to retrieval.

use tracing::debug;

use crate::race::{track, Action, Decision, DecisionSource, TireCompound};
use crate::safety::{Compatibility, ValidatedScenario};

/// Laps remaining at or below which a stop can no longer pay back
pub const FINAL_LAPS_WINDOW: u32 = 3;
/// Tire age at or below which a stint is considered fresh
pub const FRESH_TIRE_LAPS: u32 = 5;

/// How a rule's confidence is determined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleConfidence {
    Fixed(f32),
    /// Taken from the hazard severity of the compatibility verdict
    HazardSeverity,
}

/// One rung of the ladder
pub struct RuleSpec {
    pub name: &'static str,
    pub matches: fn(&ValidatedScenario) -> bool,
    pub action: Action,
    pub confidence: RuleConfidence,
    pub rationale: fn(&ValidatedScenario) -> String,
}

impl std::fmt::Debug for RuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSpec")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("confidence", &self.confidence)
            .finish()
    }
}

impl RuleSpec {
    fn decide(&self, scenario: &ValidatedScenario) -> Decision {
        let confidence = match self.confidence {
            RuleConfidence::Fixed(c) => c,
            RuleConfidence::HazardSeverity => match scenario.compatibility() {
                Compatibility::Hazard(severity) => severity.override_confidence(),
                // The predicate guarantees a hazard; keep the floor of the band otherwise
                _ => 0.95,
            },
        };
        Decision::new(
            self.action,
            confidence,
            format!("[{}] {}", self.name, (self.rationale)(scenario)),
            DecisionSource::Rule,
        )
    }
}

/// Age past which a neutralized stop is worth taking on this track
pub fn degradation_threshold(track_name: &str, compound: TireCompound) -> u32 {
    let scaled = compound.degradation_threshold() as f32 * track::degradation_factor(track_name);
    (scaled.round() as u32).max(1)
}

fn safety_override(s: &ValidatedScenario) -> bool {
    s.compatibility().is_hazard()
}

fn safety_override_rationale(s: &ValidatedScenario) -> String {
    match s.compatibility() {
        Compatibility::Hazard(severity) => crate::safety::compatibility::describe_hazard(
            s.compound(),
            s.scenario().weather,
            severity,
        ),
        _ => "Tire and weather mismatch.".to_string(),
    }
}

fn final_laps(s: &ValidatedScenario) -> bool {
    s.laps_remaining() <= FINAL_LAPS_WINDOW
}

fn final_laps_rationale(s: &ValidatedScenario) -> String {
    format!(
        "Race ends in {} lap(s). A pit stop cannot recover the lost track position.",
        s.laps_remaining()
    )
}

fn neutralized_aged_tires(s: &ValidatedScenario) -> bool {
    let scenario = s.scenario();
    scenario.is_neutralized()
        && s.tire_age() >= degradation_threshold(&scenario.track, s.compound())
}

fn neutralized_aged_tires_rationale(s: &ValidatedScenario) -> String {
    let scenario = s.scenario();
    let period = if scenario.safety_car { "Safety car" } else { "Virtual safety car" };
    format!(
        "{} active with {}-lap-old {} tires (threshold {} at {}). Cheapest pit window of the race.",
        period,
        s.tire_age(),
        s.compound(),
        degradation_threshold(&scenario.track, s.compound()),
        scenario.track
    )
}

fn fresh_tires(s: &ValidatedScenario) -> bool {
    s.tire_age() <= FRESH_TIRE_LAPS && s.compatibility() == Compatibility::Optimal
}

fn fresh_tires_rationale(s: &ValidatedScenario) -> String {
    format!(
        "{} tires only {} lap(s) old and right for {} conditions. Plenty of life left.",
        s.compound(),
        s.tire_age(),
        s.scenario().weather.as_str()
    )
}

/// Canonical ordering, highest priority first
pub static STANDARD_RULES: [RuleSpec; 4] = [
    RuleSpec {
        name: "safety_override",
        matches: safety_override,
        action: Action::Box,
        confidence: RuleConfidence::HazardSeverity,
        rationale: safety_override_rationale,
    },
    RuleSpec {
        name: "final_laps",
        matches: final_laps,
        action: Action::StayOut,
        confidence: RuleConfidence::Fixed(0.90),
        rationale: final_laps_rationale,
    },
    RuleSpec {
        name: "safety_car_aged_tires",
        matches: neutralized_aged_tires,
        action: Action::Box,
        confidence: RuleConfidence::Fixed(0.85),
        rationale: neutralized_aged_tires_rationale,
    },
    RuleSpec {
        name: "fresh_tires",
        matches: fresh_tires,
        action: Action::StayOut,
        confidence: RuleConfidence::Fixed(0.90),
        rationale: fresh_tires_rationale,
    },
];

/// Ordered rule evaluation with short-circuiting
#[derive(Debug, Clone, Copy)]
pub struct RuleLadder {
    rules: &'static [RuleSpec],
}

impl RuleLadder {
    pub fn new(rules: &'static [RuleSpec]) -> Self {
        Self { rules }
    }

    pub fn standard() -> Self {
        Self::new(&STANDARD_RULES)
    }

    pub fn rules(&self) -> &'static [RuleSpec] {
        self.rules
    }

    /// First matching rule's decision, or `None` if the ladder declines
    pub fn apply(&self, scenario: &ValidatedScenario) -> Option<Decision> {
        let rule = self.rules.iter().find(|r| (r.matches)(scenario))?;
        debug!("Rule '{}' matched {}", rule.name, scenario.scenario().label());
        Some(rule.decide(scenario))
    }

    /// Name of the rule that would fire, for diagnostics
    pub fn matching_rule(&self, scenario: &ValidatedScenario) -> Option<&'static str> {
        self.rules.iter().find(|r| (r.matches)(scenario)).map(|r| r.name)
    }
}

impl Default for RuleLadder {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::{Scenario, Weather};
    use crate::safety::ScenarioValidator;

    fn validated(s: Scenario) -> ValidatedScenario {
        ScenarioValidator::new().validate(s).unwrap()
    }

    #[test]
    fn test_fresh_tires_at_start() {
        let s = validated(Scenario::new("Silverstone", 1, 52, "SOFT", 0, Weather::Dry));
        let d = RuleLadder::standard().apply(&s).unwrap();
        assert_eq!(d.action, Action::StayOut);
        assert_eq!(d.source, DecisionSource::Rule);
        assert!((d.confidence - 0.90).abs() < 1e-6);
        assert!(d.rationale.starts_with("[fresh_tires]"));
    }

    #[test]
    fn test_final_laps_beats_aged_tires() {
        let s = validated(Scenario::new("Silverstone", 50, 52, "HARD", 20, Weather::Dry));
        let d = RuleLadder::standard().apply(&s).unwrap();
        assert_eq!(d.action, Action::StayOut);
        assert!(d.rationale.starts_with("[final_laps]"));
    }

    #[test]
    fn test_final_laps_beats_safety_car() {
        let s = validated(
            Scenario::new("Monza", 51, 53, "MEDIUM", 30, Weather::Dry).with_safety_car(),
        );
        assert_eq!(RuleLadder::standard().matching_rule(&s), Some("final_laps"));
    }

    #[test]
    fn test_safety_override_beats_everything() {
        let s = validated(Scenario::new("Spa", 43, 44, "SOFT", 2, Weather::HeavyRain));
        let d = RuleLadder::standard().apply(&s).unwrap();
        assert_eq!(d.action, Action::Box);
        assert!((d.confidence - 0.98).abs() < 1e-6);
    }

    #[test]
    fn test_intermediate_on_dry_is_lowest_override() {
        let s = validated(Scenario::new("Monza", 20, 53, "INTERMEDIATE", 10, Weather::Dry));
        let d = RuleLadder::standard().apply(&s).unwrap();
        assert_eq!(d.action, Action::Box);
        assert!((d.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_safety_car_with_aged_tires() {
        let s = validated(
            Scenario::new("Singapore", 20, 62, "MEDIUM", 19, Weather::Dry).with_safety_car(),
        );
        let d = RuleLadder::standard().apply(&s).unwrap();
        assert_eq!(d.action, Action::Box);
        assert!((d.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_vsc_counts_as_neutralization() {
        let s = validated(
            Scenario::new("Singapore", 20, 62, "MEDIUM", 19, Weather::Dry).with_virtual_safety_car(),
        );
        assert_eq!(RuleLadder::standard().matching_rule(&s), Some("safety_car_aged_tires"));
    }

    #[test]
    fn test_safety_car_with_young_tires_declines() {
        let s = validated(
            Scenario::new("Monaco", 30, 78, "HARD", 9, Weather::Dry).with_safety_car(),
        );
        // Monaco scales the HARD threshold 12 up to 16
        assert_eq!(degradation_threshold("Monaco", TireCompound::Hard), 16);
        assert!(RuleLadder::standard().apply(&s).is_none());
    }

    #[test]
    fn test_track_scales_threshold() {
        assert_eq!(degradation_threshold("Silverstone", TireCompound::Medium), 8);
        assert_eq!(degradation_threshold("Unknown Ring", TireCompound::Medium), 10);
    }

    #[test]
    fn test_marginal_pairing_is_not_short_circuited() {
        let s = validated(Scenario::new("Spa", 10, 44, "INTERMEDIATE", 5, Weather::HeavyRain));
        assert!(RuleLadder::standard().apply(&s).is_none());
    }

    #[test]
    fn test_mid_stint_declines() {
        let s = validated(Scenario::new("Silverstone", 25, 52, "MEDIUM", 20, Weather::Dry));
        assert!(RuleLadder::standard().apply(&s).is_none());
    }
}
