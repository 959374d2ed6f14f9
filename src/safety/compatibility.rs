//! Tire / Weather Compatibility
//!
//! Classifies a compound on a given track surface. Hazards do not reject the
//! scenario; they are handed to the rule ladder's safety override.

use serde::{Deserialize, Serialize};

use crate::race::{TireCompound, Weather};

/// How dangerous a compound is for the current conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardSeverity {
    /// Intermediates on a dry line: overheating, no grip loss yet
    Moderate,
    /// Slicks on a wet track
    Severe,
    /// Full wets on a dry track: the tread blisters within a lap
    Critical,
    /// Slicks in heavy rain: aquaplaning
    Extreme,
}

impl HazardSeverity {
    /// Confidence attached to the safety override for this severity
    pub fn override_confidence(&self) -> f32 {
        match self {
            HazardSeverity::Moderate => 0.95,
            HazardSeverity::Severe => 0.96,
            HazardSeverity::Critical => 0.97,
            HazardSeverity::Extreme => 0.98,
        }
    }
}

/// Verdict of the compatibility table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "severity")]
pub enum Compatibility {
    /// The compound the conditions call for
    Optimal,
    /// Usable, but a judgment call (crossover conditions)
    Marginal,
    Hazard(HazardSeverity),
}

impl Compatibility {
    pub fn is_hazard(&self) -> bool {
        matches!(self, Compatibility::Hazard(_))
    }
}

pub fn assess(compound: TireCompound, weather: Weather) -> Compatibility {
    use Compatibility::*;
    use HazardSeverity::*;

    match (weather, compound) {
        (Weather::Dry, c) if c.is_slick() => Optimal,
        (Weather::Dry, TireCompound::Intermediate) => Hazard(Moderate),
        (Weather::Dry, _) => Hazard(Critical),

        (Weather::Damp, TireCompound::Intermediate) => Optimal,
        (Weather::Damp, _) => Marginal,

        (Weather::Wet, c) if c.is_slick() => Hazard(Severe),
        (Weather::Wet, _) => Optimal,

        (Weather::HeavyRain, c) if c.is_slick() => Hazard(Extreme),
        (Weather::HeavyRain, TireCompound::Intermediate) => Marginal,
        (Weather::HeavyRain, _) => Optimal,
    }
}

/// Human-readable explanation for a hazard, used as the override rationale
pub fn describe_hazard(compound: TireCompound, weather: Weather, severity: HazardSeverity) -> String {
    if compound.is_slick() {
        format!(
            "Slick {} tires in {} conditions ({:?} hazard). Must change to INTERMEDIATE or WET.",
            compound,
            weather.as_str(),
            severity
        )
    } else {
        format!(
            "{} tires will overheat on a {} track ({:?} hazard). Must change to a slick compound.",
            compound,
            weather.as_str(),
            severity
        )
    }
}
