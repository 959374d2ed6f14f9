use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use pitwall::agent::{AuditOutcome, InferenceOptions, LLMProvider, ReasoningConfig, ReasoningFallback};
use pitwall::memory::{golden, ConsensusRetriever, CorpusEntry, FeatureEmbedder, ScenarioCorpus, ScenarioEmbedder};
use pitwall::orchestrator::{DecisionEngine, EngineState};
use pitwall::race::{Action, DecisionSource, RegulationEra, Scenario, Weather};
use pitwall::StrategyError;

struct SmartMockProvider {
    calls: AtomicUsize,
    delay: Option<Duration>,
    garbled: bool,
}

impl SmartMockProvider {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0), delay: None, garbled: false }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::new() }
    }

    fn garbled() -> Self {
        Self { garbled: true, ..Self::new() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for SmartMockProvider {
    async fn generate(
        &self,
        _model: &str,
        prompt: String,
        _system: Option<String>,
        options: InferenceOptions,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!("MOCK PROMPT: {}", prompt);
        assert_eq!(options, InferenceOptions { temperature: 0.0, seed: 42 });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.garbled {
            return Ok("I think the driver could go either way, hard to say.".to_string());
        }

        if prompt.contains("INTERMEDIATE compound") && prompt.contains("heavy_rain") {
            return Ok("```json\n{\"decision\": \"BOX\", \"confidence\": 0.72, \"reasoning\": \"Rain intensifying; full wets are the safer tire.\"}\n```".to_string());
        }
        Ok(r#"{"decision": "STAY_OUT", "confidence": 0.6, "reasoning": "No clear gain from stopping."}"#.to_string())
    }
}

fn golden_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("datasets/golden")
}

/// Corpus of near-identical mid-stint Silverstone scenarios labelled with `actions`
fn uniform_corpus(actions: &[Action]) -> ScenarioCorpus {
    let entries = actions
        .iter()
        .enumerate()
        .map(|(i, action)| {
            let s = Scenario::new("Silverstone", 25, 52, "MEDIUM", 18 + i as i64, Weather::Dry);
            let embedding = FeatureEmbedder.embed(&s).unwrap();
            CorpusEntry::new(format!("hist_{}", i), s, *action, "historical call", embedding)
        })
        .collect();
    ScenarioCorpus::from_entries("feature", FeatureEmbedder.dimension(), entries).unwrap()
}

fn engine_with(actions: &[Action], provider: Arc<SmartMockProvider>) -> DecisionEngine {
    let retriever = ConsensusRetriever::new(Arc::new(FeatureEmbedder), uniform_corpus(actions));
    DecisionEngine::new(retriever)
        .with_reasoner(ReasoningFallback::new(provider, ReasoningConfig::default()))
}

async fn golden_engine(provider: Arc<SmartMockProvider>) -> DecisionEngine {
    let cases = golden::load_golden_dir(&golden_dir()).await.unwrap();
    let corpus = ScenarioCorpus::build(&cases, &FeatureEmbedder).unwrap();
    DecisionEngine::new(ConsensusRetriever::new(Arc::new(FeatureEmbedder), corpus))
        .with_reasoner(ReasoningFallback::new(provider, ReasoningConfig::default()))
}

fn mid_stint() -> Scenario {
    Scenario::new("Silverstone", 25, 52, "MEDIUM", 20, Weather::Dry)
}

#[tokio::test]
async fn test_final_laps_stay_out_regardless_of_corpus() {
    let provider = Arc::new(SmartMockProvider::new());
    let engine = engine_with(&[Action::Box; 5], provider.clone());

    let d = engine
        .decide(Scenario::new("Silverstone", 50, 52, "MEDIUM", 20, Weather::Dry))
        .await
        .unwrap();
    assert_eq!(d.action, Action::StayOut);
    assert_eq!(d.source, DecisionSource::Rule);
    assert!((d.confidence - 0.90).abs() < 1e-6);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_hazard_overrides_every_other_stage() {
    let provider = Arc::new(SmartMockProvider::new());
    let engine = engine_with(&[Action::StayOut; 5], provider.clone());

    let d = engine
        .decide(Scenario::new("Spa-Francorchamps", 12, 44, "SOFT", 4, Weather::HeavyRain))
        .await
        .unwrap();
    assert_eq!(d.action, Action::Box);
    assert_eq!(d.source, DecisionSource::Rule);
    assert!(d.confidence >= 0.95);

    // Hazard wins even inside the final-laps window
    let d = engine
        .decide(Scenario::new("Silverstone", 51, 52, "WET", 3, Weather::Dry))
        .await
        .unwrap();
    assert_eq!(d.action, Action::Box);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_impossible_inputs_rejected() {
    let provider = Arc::new(SmartMockProvider::new());
    let engine = engine_with(&[Action::Box; 5], provider.clone());

    let err = engine
        .decide(Scenario::new("Silverstone", 10, 52, "SOFT", -1, Weather::Dry))
        .await
        .unwrap_err();
    assert!(matches!(err, StrategyError::ImpossibleTireAge { .. }));

    let err = engine
        .decide(Scenario::new("Silverstone", 10, 52, "ULTRASOFT", 3, Weather::Dry))
        .await
        .unwrap_err();
    assert!(matches!(err, StrategyError::InvalidCompound { .. }));

    let ok = engine
        .decide(
            Scenario::new("Silverstone", 10, 52, "ULTRASOFT", 3, Weather::Dry)
                .with_era(RegulationEra::Era2014),
        )
        .await;
    assert!(ok.is_ok());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_rule_and_retrieval_are_byte_identical() {
    use Action::*;
    let provider = Arc::new(SmartMockProvider::new());
    let engine = engine_with(&[Box, Box, Box, Box, StayOut], provider);

    for scenario in [
        Scenario::new("Silverstone", 1, 52, "SOFT", 0, Weather::Dry),
        mid_stint(),
    ] {
        let a = engine.decide(scenario.clone()).await.unwrap();
        let b = engine.clone().decide(scenario).await.unwrap();
        assert_ne!(a.source, DecisionSource::Reasoning);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}

#[tokio::test]
async fn test_consensus_four_of_five_passes_three_declines() {
    use Action::*;
    let provider = Arc::new(SmartMockProvider::new());

    let d = engine_with(&[Box, Box, StayOut, Box, Box], provider.clone())
        .decide(mid_stint())
        .await
        .unwrap();
    assert_eq!(d.source, DecisionSource::Retrieval);
    assert_eq!(d.action, Box);
    assert!((0.65..=0.85).contains(&d.confidence));
    assert_eq!(provider.calls(), 0);

    let trace = engine_with(&[Box, StayOut, Box, StayOut, Box], provider.clone())
        .decide_traced(mid_stint())
        .await
        .unwrap();
    assert_eq!(trace.decision.source, DecisionSource::Reasoning);
    assert!(trace.states.contains(&EngineState::Reasoning));
    assert_eq!(trace.neighbors.len(), 5);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_silverstone_lap_one_fresh_softs() {
    let provider = Arc::new(SmartMockProvider::new());
    let engine = golden_engine(provider).await;

    let trace = engine
        .decide_traced(Scenario::new("Silverstone", 1, 52, "SOFT", 0, Weather::Dry))
        .await
        .unwrap();
    assert_eq!(trace.decision.action, Action::StayOut);
    assert_eq!(trace.decision.source, DecisionSource::Rule);
    assert!((trace.decision.confidence - 0.90).abs() < 1e-6);
    assert_eq!(trace.rule.as_deref(), Some("fresh_tires"));
    assert!(trace.decision.rationale.starts_with("[fresh_tires]"));
}

#[tokio::test]
async fn test_intermediates_in_heavy_rain_not_settled_by_rules() {
    let provider = Arc::new(SmartMockProvider::new());
    let engine = golden_engine(provider).await;

    let trace = engine
        .decide_traced(Scenario::new("Spa-Francorchamps", 20, 44, "INTERMEDIATE", 5, Weather::HeavyRain))
        .await
        .unwrap();
    assert_ne!(trace.decision.source, DecisionSource::Rule);
    assert!(trace.rule.is_none());
    assert!(trace.states.contains(&EngineState::Retrieval));
}

#[tokio::test]
async fn test_reasoning_timeout_is_fatal_and_audited() {
    use Action::*;
    let provider = Arc::new(SmartMockProvider::slow(Duration::from_secs(5)));
    let reasoner = ReasoningFallback::new(
        provider.clone(),
        ReasoningConfig::default().with_timeout(Duration::from_millis(50)),
    );
    let audit = reasoner.audit();
    let engine = DecisionEngine::new(ConsensusRetriever::new(
        Arc::new(FeatureEmbedder),
        uniform_corpus(&[Box, Box, Box, StayOut, StayOut]),
    ))
    .with_reasoner(reasoner);

    let err = engine.decide(mid_stint()).await.unwrap_err();
    assert!(matches!(err, StrategyError::ReasoningTimeout(_)));
    assert_eq!(provider.calls(), 1);

    let records = audit.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Timeout);
    assert!(records[0].raw.is_none());
}

#[tokio::test]
async fn test_unparseable_reasoning_is_not_retried() {
    use Action::*;
    let provider = Arc::new(SmartMockProvider::garbled());
    let reasoner = ReasoningFallback::new(provider.clone(), ReasoningConfig::default());
    let audit = reasoner.audit();
    let engine = DecisionEngine::new(ConsensusRetriever::new(
        Arc::new(FeatureEmbedder),
        uniform_corpus(&[Box, Box, Box, StayOut, StayOut]),
    ))
    .with_reasoner(reasoner);

    let err = engine.decide(mid_stint()).await.unwrap_err();
    assert_eq!(err.kind(), "UnparseableReasoning");
    assert_eq!(provider.calls(), 1);

    let records = audit.records().await;
    assert_eq!(records[0].outcome, AuditOutcome::Unparseable);
    assert!(records[0].raw.as_deref().unwrap_or("").contains("either way"));
}

#[tokio::test]
async fn test_empty_corpus_falls_through_to_reasoning() {
    let provider = Arc::new(SmartMockProvider::new());
    let engine = engine_with(&[], provider.clone());

    let trace = engine.decide_traced(mid_stint()).await.unwrap();
    assert_eq!(trace.decision.source, DecisionSource::Reasoning);
    assert!(trace.neighbors.is_empty());
    assert_eq!(provider.calls(), 1);
}
