use serde::{Deserialize, Serialize};

/// The two strategic calls available to the pit wall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "BOX")]
    Box,
    #[serde(rename = "STAY_OUT")]
    StayOut,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Box => "BOX",
            Action::StayOut => "STAY_OUT",
        }
    }

    /// Lenient label parsing for model output: case-insensitive, and
    /// "stay out" / "stay-out" are accepted as STAY_OUT.
    pub fn parse_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '.')
            .to_uppercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "BOX" | "PIT" => Some(Action::Box),
            "STAY_OUT" | "STAYOUT" => Some(Action::StayOut),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which pipeline stage produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionSource {
    Rule,
    Retrieval,
    Reasoning,
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionSource::Rule => write!(f, "RULE"),
            DecisionSource::Retrieval => write!(f, "RETRIEVAL"),
            DecisionSource::Reasoning => write!(f, "REASONING"),
        }
    }
}

/// Output of the engine: exactly one per scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Calibrated confidence (0.0 - 1.0)
    pub confidence: f32,
    pub rationale: String,
    pub source: DecisionSource,
}

impl Decision {
    pub fn new(
        action: Action,
        confidence: f32,
        rationale: impl Into<String>,
        source: DecisionSource,
    ) -> Self {
        // clamp passes NaN through
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            action,
            confidence,
            rationale: rationale.into(),
            source,
        }
    }
}

/// Track weather, coarsest to harshest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Dry,
    #[serde(alias = "drizzle", alias = "light_rain")]
    Damp,
    #[serde(alias = "rain")]
    Wet,
    #[serde(alias = "monsoon")]
    HeavyRain,
}

impl Weather {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "dry" => Some(Weather::Dry),
            "damp" | "drizzle" | "light_rain" => Some(Weather::Damp),
            "wet" | "rain" => Some(Weather::Wet),
            "heavy_rain" | "monsoon" => Some(Weather::HeavyRain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Dry => "dry",
            Weather::Damp => "damp",
            Weather::Wet => "wet",
            Weather::HeavyRain => "heavy_rain",
        }
    }

    /// 0 (dry) to 3 (heavy rain)
    pub fn severity(&self) -> u8 {
        match self {
            Weather::Dry => 0,
            Weather::Damp => 1,
            Weather::Wet => 2,
            Weather::HeavyRain => 3,
        }
    }
}

/// FIA tire regulation eras with distinct compound nomenclature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RegulationEra {
    /// 2014-2018: seven slick names
    #[serde(rename = "era_2014")]
    Era2014,
    /// 2019 onward: SOFT / MEDIUM / HARD
    #[default]
    #[serde(rename = "era_2019")]
    Era2019,
}

impl RegulationEra {
    /// Accepts era tags ("era_2019", "current") or a season year ("2023").
    pub fn from_label(label: &str) -> Option<Self> {
        let l = label.trim().to_lowercase();
        match l.as_str() {
            "era_2014" | "2014-2018" | "hybrid_v1" => return Some(RegulationEra::Era2014),
            "era_2019" | "2019+" | "current" => return Some(RegulationEra::Era2019),
            _ => {}
        }
        let year: u32 = l.trim_end_matches('+').parse().ok()?;
        match year {
            2014..=2018 => Some(RegulationEra::Era2014),
            2019..=2100 => Some(RegulationEra::Era2019),
            _ => None,
        }
    }

    pub fn valid_compounds(&self) -> &'static [TireCompound] {
        use TireCompound::*;
        match self {
            RegulationEra::Era2014 => &[
                Hypersoft, Ultrasoft, Supersoft, Soft, Medium, Hard, Superhard, Intermediate, Wet,
            ],
            RegulationEra::Era2019 => &[Soft, Medium, Hard, Intermediate, Wet],
        }
    }

    pub fn allows(&self, compound: TireCompound) -> bool {
        self.valid_compounds().contains(&compound)
    }
}

impl std::fmt::Display for RegulationEra {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegulationEra::Era2014 => write!(f, "2014-2018"),
            RegulationEra::Era2019 => write!(f, "2019+"),
        }
    }
}

/// Every compound name the regulations have ever used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TireCompound {
    Hypersoft,
    Ultrasoft,
    Supersoft,
    Soft,
    Medium,
    Hard,
    Superhard,
    Intermediate,
    Wet,
}

impl TireCompound {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "HYPERSOFT" => Some(TireCompound::Hypersoft),
            "ULTRASOFT" => Some(TireCompound::Ultrasoft),
            "SUPERSOFT" => Some(TireCompound::Supersoft),
            "SOFT" => Some(TireCompound::Soft),
            "MEDIUM" => Some(TireCompound::Medium),
            "HARD" => Some(TireCompound::Hard),
            "SUPERHARD" => Some(TireCompound::Superhard),
            "INTERMEDIATE" | "INTER" => Some(TireCompound::Intermediate),
            "WET" | "FULL_WET" => Some(TireCompound::Wet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TireCompound::Hypersoft => "HYPERSOFT",
            TireCompound::Ultrasoft => "ULTRASOFT",
            TireCompound::Supersoft => "SUPERSOFT",
            TireCompound::Soft => "SOFT",
            TireCompound::Medium => "MEDIUM",
            TireCompound::Hard => "HARD",
            TireCompound::Superhard => "SUPERHARD",
            TireCompound::Intermediate => "INTERMEDIATE",
            TireCompound::Wet => "WET",
        }
    }

    pub fn is_slick(&self) -> bool {
        !matches!(self, TireCompound::Intermediate | TireCompound::Wet)
    }

    /// Longest stint a set of this compound can physically survive
    pub fn max_age(&self) -> u32 {
        match self {
            TireCompound::Hypersoft => 25,
            TireCompound::Ultrasoft => 30,
            TireCompound::Supersoft => 35,
            TireCompound::Soft => 40,
            TireCompound::Medium => 55,
            TireCompound::Hard => 70,
            TireCompound::Superhard => 75,
            TireCompound::Intermediate => 60,
            TireCompound::Wet => 60,
        }
    }

    /// Age (laps) past which a neutralized pit stop is worth taking, before track scaling
    pub fn degradation_threshold(&self) -> u32 {
        match self {
            TireCompound::Hypersoft
            | TireCompound::Ultrasoft
            | TireCompound::Supersoft
            | TireCompound::Soft => 8,
            TireCompound::Medium => 10,
            TireCompound::Hard | TireCompound::Superhard => 12,
            TireCompound::Intermediate | TireCompound::Wet => 10,
        }
    }

    /// Softest-to-wettest ordinal in 0.0..=1.0, used for embedding
    pub fn code(&self) -> f32 {
        let ordinal = match self {
            TireCompound::Hypersoft | TireCompound::Ultrasoft | TireCompound::Supersoft => 0,
            TireCompound::Soft => 0,
            TireCompound::Medium => 1,
            TireCompound::Hard | TireCompound::Superhard => 2,
            TireCompound::Intermediate => 3,
            TireCompound::Wet => 4,
        };
        ordinal as f32 / 4.0
    }
}

impl std::fmt::Display for TireCompound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time gaps to the nearest rivals, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gaps {
    #[serde(default)]
    pub ahead: Option<f32>,
    #[serde(default)]
    pub behind: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RacePhase {
    Start,
    EarlyRace,
    MidRace,
    LateRace,
    FinalLaps,
}

impl std::fmt::Display for RacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RacePhase::Start => "START",
            RacePhase::EarlyRace => "EARLY_RACE",
            RacePhase::MidRace => "MID_RACE",
            RacePhase::LateRace => "LATE_RACE",
            RacePhase::FinalLaps => "FINAL_LAPS",
        };
        write!(f, "{}", s)
    }
}

/// A race-state snapshot for one car.
///
/// Integer fields are signed so that impossible values survive parsing and
/// are rejected by the validator with a precise error. Optional fields are
/// always serialized so corpus snapshots stay bincode-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub id: Option<String>,
    pub track: String,
    pub current_lap: i64,
    pub max_race_laps: i64,
    #[serde(default)]
    pub regulation_era: RegulationEra,
    /// Raw compound label; checked against the era by the validator
    pub compound: String,
    pub tire_age: i64,
    #[serde(default)]
    pub gaps: Gaps,
    pub weather: Weather,
    pub safety_car: bool,
    #[serde(default)]
    pub virtual_safety_car: bool,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Scenario {
    pub fn new(
        track: impl Into<String>,
        current_lap: i64,
        max_race_laps: i64,
        compound: impl Into<String>,
        tire_age: i64,
        weather: Weather,
    ) -> Self {
        Self {
            id: None,
            track: track.into(),
            current_lap,
            max_race_laps,
            regulation_era: RegulationEra::default(),
            compound: compound.into(),
            tire_age,
            gaps: Gaps::default(),
            weather,
            safety_car: false,
            virtual_safety_car: false,
            driver: None,
            position: None,
            description: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_safety_car(mut self) -> Self {
        self.safety_car = true;
        self
    }

    pub fn with_virtual_safety_car(mut self) -> Self {
        self.virtual_safety_car = true;
        self
    }

    pub fn with_era(mut self, era: RegulationEra) -> Self {
        self.regulation_era = era;
        self
    }

    pub fn with_gaps(mut self, ahead: Option<f32>, behind: Option<f32>) -> Self {
        self.gaps = Gaps { ahead, behind };
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn laps_remaining(&self) -> i64 {
        self.max_race_laps - self.current_lap
    }

    /// Safety car or virtual safety car deployed
    pub fn is_neutralized(&self) -> bool {
        self.safety_car || self.virtual_safety_car
    }

    pub fn race_phase(&self) -> RacePhase {
        let remaining = self.laps_remaining();
        if self.current_lap <= 1 {
            RacePhase::Start
        } else if remaining <= 3 {
            RacePhase::FinalLaps
        } else if remaining <= 10 {
            RacePhase::LateRace
        } else if self.current_lap <= 15 {
            RacePhase::EarlyRace
        } else {
            RacePhase::MidRace
        }
    }

    /// Identifier for logs; falls back to track and lap
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}_lap{}", self.track.to_lowercase().replace(' ', "_"), self.current_lap),
        }
    }
}
