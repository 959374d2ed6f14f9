//! Golden Datasets
//!
//! Historical race situations with the call the team actually made. They
//! seed the retrieval corpus and serve as evaluation ground truth.
//!
//! File layout: `{ "race": {...}, "scenarios": [...] }`, one file per race.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::race::{Action, Gaps, RegulationEra, Scenario, TireCompound, Weather};

const RACE_FIELDS: &[&str] = &["name", "track", "date", "total_laps", "regulation_era"];
const SCENARIO_FIELDS: &[&str] = &[
    "id",
    "name",
    "lap",
    "driver",
    "position",
    "tires",
    "weather",
    "context",
    "golden_truth",
];
const TRUTH_FIELDS: &[&str] = &["decision", "rationale", "confidence_level", "risk_level"];
const TIRE_FIELDS: &[&str] = &["compound", "age_laps"];
const LEVELS: &[&str] = &["LOW", "MEDIUM", "HIGH"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceInfo {
    pub name: String,
    pub track: String,
    pub date: String,
    pub total_laps: i64,
    pub regulation_era: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TireInfo {
    pub compound: String,
    pub age_laps: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherInfo {
    pub condition: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioContext {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenTruth {
    pub decision: String,
    pub rationale: String,
    pub confidence_level: String,
    pub risk_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenScenario {
    pub id: String,
    pub name: String,
    pub lap: i64,
    pub driver: String,
    pub position: Option<u32>,
    pub tires: TireInfo,
    pub weather: WeatherInfo,
    /// "green_flag", "safety_car" or "virtual_safety_car"
    #[serde(default)]
    pub race_state: Option<String>,
    #[serde(default)]
    pub gaps: Gaps,
    #[serde(default)]
    pub context: ScenarioContext,
    pub golden_truth: GoldenTruth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenDataset {
    pub race: RaceInfo,
    pub scenarios: Vec<GoldenScenario>,
}

/// One labelled case: the scenario plus the decision it should produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenCase {
    pub id: String,
    pub dataset: String,
    pub scenario: Scenario,
    pub expected: Action,
    pub rationale: String,
}

/// Every schema problem in a raw dataset document. Empty means valid.
pub fn validate_golden_dataset(dataset: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    let Some(race) = dataset.get("race") else {
        errors.push("Missing 'race' metadata".to_string());
        return errors;
    };
    for field in RACE_FIELDS {
        if race.get(field).is_none() {
            errors.push(format!("Race metadata missing field: {}", field));
        }
    }
    let era = race
        .get("regulation_era")
        .and_then(Value::as_str)
        .map(|label| match RegulationEra::from_label(label) {
            Some(era) => era,
            None => {
                errors.push(format!("Unknown regulation era: {}", label));
                RegulationEra::default()
            }
        })
        .unwrap_or_default();

    let Some(scenarios) = dataset.get("scenarios").and_then(Value::as_array) else {
        errors.push("Missing 'scenarios' array".to_string());
        return errors;
    };

    for (i, scenario) in scenarios.iter().enumerate() {
        let sid = scenario
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("scenario_{}", i));

        for field in SCENARIO_FIELDS {
            if scenario.get(field).is_none() {
                errors.push(format!("[{}] Missing field: {}", sid, field));
            }
        }

        if let Some(truth) = scenario.get("golden_truth") {
            for field in TRUTH_FIELDS {
                if truth.get(field).is_none() {
                    errors.push(format!("[{}] Golden truth missing: {}", sid, field));
                }
            }
            if let Some(decision) = truth.get("decision").and_then(Value::as_str) {
                if !matches!(decision, "BOX" | "STAY_OUT") {
                    errors.push(format!("[{}] Invalid decision: {}", sid, decision));
                }
            }
            for level in ["confidence_level", "risk_level"] {
                if let Some(v) = truth.get(level).and_then(Value::as_str) {
                    if !LEVELS.contains(&v) {
                        errors.push(format!("[{}] Invalid {}: {}", sid, level, v));
                    }
                }
            }
        }

        if let Some(tires) = scenario.get("tires") {
            for field in TIRE_FIELDS {
                if tires.get(field).is_none() {
                    errors.push(format!("[{}] Tires missing field: {}", sid, field));
                }
            }
            if let Some(compound) = tires.get("compound").and_then(Value::as_str) {
                let valid = TireCompound::from_label(compound).map_or(false, |c| era.allows(c));
                if !valid {
                    errors.push(format!("[{}] Invalid compound: {}", sid, compound));
                }
            }
        }

        if let Some(condition) = scenario.pointer("/weather/condition").and_then(Value::as_str) {
            if Weather::from_label(condition).is_none() {
                errors.push(format!("[{}] Invalid weather condition: {}", sid, condition));
            }
        }
    }

    errors
}

impl GoldenScenario {
    pub fn to_scenario(&self, race: &RaceInfo) -> Result<Scenario> {
        let weather = Weather::from_label(&self.weather.condition)
            .with_context(|| format!("[{}] unknown weather '{}'", self.id, self.weather.condition))?;
        let era = RegulationEra::from_label(&race.regulation_era)
            .with_context(|| format!("unknown regulation era '{}'", race.regulation_era))?;
        let state = self.race_state.as_deref().unwrap_or("green_flag").to_lowercase();
        let vsc = state.contains("virtual") || state == "vsc";
        let sc = !vsc && (state.contains("safety_car") || state == "sc");

        Ok(Scenario {
            id: Some(self.id.clone()),
            track: race.track.clone(),
            current_lap: self.lap,
            max_race_laps: race.total_laps,
            regulation_era: era,
            compound: self.tires.compound.clone(),
            tire_age: self.tires.age_laps,
            gaps: self.gaps,
            weather,
            safety_car: sc,
            virtual_safety_car: vsc,
            driver: Some(self.driver.clone()),
            position: self.position,
            description: self.context.description.clone(),
        })
    }

    pub fn expected_action(&self) -> Result<Action> {
        Action::parse_label(&self.golden_truth.decision)
            .with_context(|| format!("[{}] invalid decision '{}'", self.id, self.golden_truth.decision))
    }
}

impl GoldenDataset {
    /// Dataset name derived from the file stem
    pub fn cases(&self, dataset: &str) -> Result<Vec<GoldenCase>> {
        self.scenarios
            .iter()
            .map(|s| {
                Ok(GoldenCase {
                    id: s.id.clone(),
                    dataset: dataset.to_string(),
                    scenario: s.to_scenario(&self.race)?,
                    expected: s.expected_action()?,
                    rationale: s.golden_truth.rationale.clone(),
                })
            })
            .collect()
    }
}

/// Read and schema-check one dataset file
pub async fn load_dataset(path: &Path) -> Result<GoldenDataset> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read golden dataset {:?}", path))?;
    let raw: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse golden dataset {:?}", path))?;

    let errors = validate_golden_dataset(&raw);
    if !errors.is_empty() {
        bail!("Golden dataset {:?} failed validation:\n  {}", path, errors.join("\n  "));
    }

    serde_json::from_value(raw).with_context(|| format!("Malformed golden dataset {:?}", path))
}

pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// JSON files in `dir`, sorted by name so corpus order is reproducible
pub async fn dataset_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut read_dir = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read dataset directory {:?}", dir))?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |e| e == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every case from every dataset file in `dir`
pub async fn load_golden_dir(dir: &Path) -> Result<Vec<GoldenCase>> {
    let files = dataset_files(dir).await?;
    if files.is_empty() {
        warn!("No golden datasets found in {:?}", dir);
    }

    let mut cases = Vec::new();
    for path in files {
        let dataset = load_dataset(&path).await?;
        let name = dataset_name(&path);
        let loaded = dataset.cases(&name)?;
        debug!("Loaded {} scenarios from {}", loaded.len(), name);
        cases.extend(loaded);
    }
    info!("Loaded {} golden scenarios from {:?}", cases.len(), dir);
    Ok(cases)
}
