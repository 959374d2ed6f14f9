//! Scenario Embedding
//!
//! Two embedders share one trait:
//! - `FeatureEmbedder`: 11 normalized numeric features, deterministic and model-free.
//! - `HybridEmbedder`: a sentence embedding of the scenario description
//!   concatenated with the same features (384 + 11 dims).

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::race::{RacePhase, Scenario, TireCompound};

/// Numeric feature count produced by `scenario_features`
pub const FEATURE_DIM: usize = 11;
/// Output width of AllMiniLML6V2
pub const TEXT_DIM: usize = 384;

const MAX_TIRE_AGE: f32 = 50.0;
const MAX_LAP: f32 = 70.0;
const MAX_POSITION: f32 = 20.0;
const MAX_GAP: f32 = 60.0;

/// Maps a scenario to a fixed-width vector
pub trait ScenarioEmbedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, scenario: &Scenario) -> Result<Vec<f32>>;

    fn embed_batch(&self, scenarios: &[Scenario]) -> Result<Vec<Vec<f32>>> {
        scenarios.iter().map(|s| self.embed(s)).collect()
    }
}

pub fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec {
            *x /= norm;
        }
    }
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; zero when either side has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na = dot_product(a, a).sqrt();
    let nb = dot_product(b, b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / (na * nb)
}

/// The 11 raw features, each in 0.0..=1.0
pub fn scenario_features(scenario: &Scenario) -> [f32; FEATURE_DIM] {
    let compound_code = TireCompound::from_label(&scenario.compound)
        .map(|c| c.code())
        .unwrap_or(0.25);

    let phase = match scenario.race_phase() {
        RacePhase::Start => 0.0,
        RacePhase::EarlyRace => 0.25,
        RacePhase::MidRace => 0.5,
        RacePhase::LateRace => 0.75,
        RacePhase::FinalLaps => 1.0,
    };

    let progress = if scenario.max_race_laps > 0 {
        scenario.current_lap as f32 / scenario.max_race_laps as f32
    } else {
        scenario.current_lap as f32 / MAX_LAP
    };

    let remaining = scenario.laps_remaining().max(0) as f32;
    let pressure = 1.0 / (1.0 + remaining / 10.0);

    [
        (scenario.tire_age.max(0) as f32 / MAX_TIRE_AGE).min(1.0),
        compound_code,
        progress.clamp(0.0, 1.0),
        (scenario.position.unwrap_or(10) as f32 / MAX_POSITION).min(1.0),
        (scenario.gaps.ahead.unwrap_or(0.0).max(0.0) / MAX_GAP).min(1.0),
        (scenario.gaps.behind.unwrap_or(0.0).max(0.0) / MAX_GAP).min(1.0),
        scenario.weather.severity() as f32 / 3.0,
        phase,
        if scenario.safety_car { 1.0 } else { 0.0 },
        if scenario.virtual_safety_car { 1.0 } else { 0.0 },
        pressure,
    ]
}

/// Natural-language rendering used for the text half of hybrid embeddings
pub fn scenario_to_text(scenario: &Scenario) -> String {
    let mut text = format!(
        "Race situation at {} lap {} of {}. ",
        scenario.track, scenario.current_lap, scenario.max_race_laps
    );
    if let Some(p) = scenario.position {
        text.push_str(&format!("Currently in position {}. ", p));
    }
    text.push_str(&format!(
        "Running on {} compound tires that are {} laps old. Track conditions: {} weather.",
        scenario.compound,
        scenario.tire_age,
        scenario.weather.as_str()
    ));
    if scenario.safety_car {
        text.push_str("\nRace state: safety car");
    } else if scenario.virtual_safety_car {
        text.push_str("\nRace state: virtual safety car");
    }
    if let Some(desc) = &scenario.description {
        text.push('\n');
        text.push_str(desc);
    }
    text
}

/// Deterministic numeric embedder
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEmbedder;

impl ScenarioEmbedder for FeatureEmbedder {
    fn name(&self) -> &str {
        "feature"
    }

    fn dimension(&self) -> usize {
        FEATURE_DIM
    }

    fn embed(&self, scenario: &Scenario) -> Result<Vec<f32>> {
        let mut v = scenario_features(scenario).to_vec();
        normalize(&mut v);
        Ok(v)
    }
}

/// Sentence embedding plus numeric features
pub struct HybridEmbedder {
    model: Mutex<TextEmbedding>,
}

impl HybridEmbedder {
    pub fn new() -> Result<Self> {
        info!("Loading embedding model AllMiniLML6V2");
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .context("Failed to initialize embedding model")?;
        Ok(Self { model: Mutex::new(model) })
    }

    fn combine(text: Vec<f32>, scenario: &Scenario) -> Vec<f32> {
        let mut v = text;
        v.extend_from_slice(&scenario_features(scenario));
        normalize(&mut v);
        v
    }
}

impl ScenarioEmbedder for HybridEmbedder {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn dimension(&self) -> usize {
        TEXT_DIM + FEATURE_DIM
    }

    fn embed(&self, scenario: &Scenario) -> Result<Vec<f32>> {
        self.embed_batch(std::slice::from_ref(scenario))?
            .into_iter()
            .next()
            .context("No embedding")
    }

    fn embed_batch(&self, scenarios: &[Scenario]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = scenarios.iter().map(scenario_to_text).collect();
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
        let embeddings = model.embed(texts, None)?;
        drop(model);
        Ok(embeddings
            .into_iter()
            .zip(scenarios)
            .map(|(text, s)| Self::combine(text, s))
            .collect())
    }
}

/// Which embedder backs the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    #[default]
    Feature,
    Hybrid,
}

impl EmbedderKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "feature" | "features" | "numeric" => Some(EmbedderKind::Feature),
            "hybrid" | "text" => Some(EmbedderKind::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedderKind::Feature => "feature",
            EmbedderKind::Hybrid => "hybrid",
        }
    }

    pub fn build(&self) -> Result<Arc<dyn ScenarioEmbedder>> {
        let embedder: Arc<dyn ScenarioEmbedder> = match self {
            EmbedderKind::Feature => Arc::new(FeatureEmbedder),
            EmbedderKind::Hybrid => Arc::new(HybridEmbedder::new()?),
        };
        Ok(embedder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::Weather;

    #[test]
    fn test_features_are_bounded() {
        let s = Scenario::new("Monaco", 70, 78, "HARD", 65, Weather::HeavyRain)
            .with_gaps(Some(120.0), Some(-3.0))
            .with_safety_car();
        for f in scenario_features(&s) {
            assert!((0.0..=1.0).contains(&f), "feature {} out of range", f);
        }
    }

    #[test]
    fn test_feature_embedding_is_deterministic_and_unit() {
        let s = Scenario::new("Silverstone", 20, 52, "MEDIUM", 12, Weather::Dry).with_position(3);
        let a = FeatureEmbedder.embed(&s).unwrap();
        let b = FeatureEmbedder.embed(&s).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), FEATURE_DIM);
        assert!((dot_product(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_scenarios_score_higher() {
        let base = Scenario::new("Silverstone", 20, 52, "MEDIUM", 12, Weather::Dry);
        let near = Scenario::new("Silverstone", 21, 52, "MEDIUM", 13, Weather::Dry);
        let far = Scenario::new("Spa", 40, 44, "WET", 2, Weather::HeavyRain).with_safety_car();
        let e = |s: &Scenario| FeatureEmbedder.embed(s).unwrap();
        assert!(cosine_similarity(&e(&base), &e(&near)) > cosine_similarity(&e(&base), &e(&far)));
    }

    #[test]
    fn test_embedder_kind_labels() {
        assert_eq!(EmbedderKind::from_label("Hybrid"), Some(EmbedderKind::Hybrid));
        assert_eq!(EmbedderKind::from_label("bert"), None);
        assert_eq!(EmbedderKind::Feature.build().unwrap().name(), "feature");
    }

    #[test]
    fn test_cosine_of_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_text_mentions_key_facts() {
        let s = Scenario::new("Marina Bay", 20, 62, "HARD", 18, Weather::Dry).with_safety_car();
        let text = scenario_to_text(&s);
        assert!(text.contains("HARD"));
        assert!(text.contains("18 laps old"));
        assert!(text.contains("safety car"));
    }

    #[test]
    fn test_hybrid_embedding_width() {
        // Skip if ONNX lib missing to prevent process-wide panics in CI
        if std::env::var("ORT_DYLIB_PATH").is_err() {
            return;
        }
        let embedder = HybridEmbedder::new().unwrap();
        let s = Scenario::new("Monza", 10, 53, "SOFT", 9, Weather::Dry);
        let v = embedder.embed(&s).unwrap();
        assert_eq!(v.len(), embedder.dimension());
    }
}
