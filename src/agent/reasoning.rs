//! Reasoning Fallback
//!
//! Last stage of the pipeline. Asks a language model for a call when rules
//! and retrieval both declined, with the retrieved neighbours as examples.
//! Every failure mode ends in a typed error; nothing is retried.

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::audit::{AuditOutcome, AuditRecord, ReasoningAudit};
use super::provider::LLMProvider;
use super::types::ReasoningConfig;
use crate::error::{StrategyError, StrategyResult};
use crate::memory::{Neighbor, Tally};
use crate::race::{Action, Decision, DecisionSource};
use crate::safety::ValidatedScenario;
use crate::utils::truncate::{preview, truncate_text};

const MISSING_RATIONALE: &str = "No rationale provided by the reasoning model.";

// Only the action token is captured; prose after it on the same line is ignored.
static DECISION_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*DECISION\W*:\s*\**\s*[\x22'`]?(BOX|PIT|STAY[ _\-]?OUT)\b")
});
static CONFIDENCE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?im)^\W*CONFIDENCE\W*:\s*\**\s*(-?[0-9]*\.?[0-9]+)"));
static REASONING_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?im)^\W*(?:REASONING|RATIONALE)\W*:\s*(.+)$"));

fn pattern(re: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex> {
    re.as_ref().map_err(|e| anyhow::anyhow!("bad answer pattern: {}", e))
}

/// Fields extracted from a model answer before they become a `Decision`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReasoning {
    pub action: Action,
    pub confidence: f32,
    pub rationale: Option<String>,
}

pub struct ReasoningFallback {
    provider: Arc<dyn LLMProvider>,
    config: ReasoningConfig,
    audit: Arc<ReasoningAudit>,
}

impl ReasoningFallback {
    pub fn new(provider: Arc<dyn LLMProvider>, config: ReasoningConfig) -> Self {
        Self::with_audit(provider, config, Arc::new(ReasoningAudit::new()))
    }

    pub fn with_audit(
        provider: Arc<dyn LLMProvider>,
        config: ReasoningConfig,
        audit: Arc<ReasoningAudit>,
    ) -> Self {
        Self { provider, config, audit }
    }

    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }

    pub fn audit(&self) -> Arc<ReasoningAudit> {
        self.audit.clone()
    }

    pub fn build_prompt(&self, scenario: &ValidatedScenario, neighbors: &[Neighbor]) -> String {
        let s = scenario.scenario();
        let mut prompt = String::new();

        prompt.push_str("Recommend whether the driver should BOX (pit stop) or STAY_OUT (remain on track).\n\n");
        prompt.push_str("CURRENT SITUATION:\n");
        prompt.push_str(&format!("Track: {}\n", s.track));
        prompt.push_str(&format!("Lap: {} of {}\n", s.current_lap, s.max_race_laps));
        prompt.push_str(&format!("Race Phase: {}\n", s.race_phase()));
        prompt.push_str(&format!("Laps Remaining: {}\n", scenario.laps_remaining()));
        if let Some(driver) = &s.driver {
            prompt.push_str(&format!("Driver: {}\n", driver));
        }
        if let Some(position) = s.position {
            prompt.push_str(&format!("Position: P{}\n", position));
        }
        prompt.push_str(&format!(
            "Tires: {} compound, {} laps old\n",
            scenario.compound(),
            scenario.tire_age()
        ));
        prompt.push_str(&format!("Weather: {}\n", s.weather.as_str()));
        let race_state = if s.safety_car {
            "safety_car"
        } else if s.virtual_safety_car {
            "virtual_safety_car"
        } else {
            "green_flag"
        };
        prompt.push_str(&format!("Race State: {}\n", race_state));
        let gap = |g: Option<f32>| g.map_or("unknown".to_string(), |v| format!("{:.1}s", v));
        prompt.push_str(&format!(
            "Gaps: ahead {}, behind {}\n",
            gap(s.gaps.ahead),
            gap(s.gaps.behind)
        ));
        if let Some(desc) = &s.description {
            prompt.push_str(&format!("Context: {}\n", desc));
        }

        if !neighbors.is_empty() {
            prompt.push_str("\nSIMILAR HISTORICAL SCENARIOS:\n");
            for (i, n) in neighbors.iter().enumerate() {
                prompt.push_str(&format!(
                    "{}. {} (similarity {:.2}): lap {} of {}, {} tires {} laps old, {}. Decision: {}. Reasoning: {}\n",
                    i + 1,
                    n.track,
                    n.similarity,
                    n.scenario.current_lap,
                    n.scenario.max_race_laps,
                    n.scenario.compound,
                    n.scenario.tire_age,
                    n.scenario.weather.as_str(),
                    n.action,
                    truncate_text(&n.rationale, self.config.example_rationale_chars)
                ));
            }
            let tally = Tally::of(neighbors);
            prompt.push_str(&format!(
                "\nVotes: {} x STAY_OUT, {} x BOX (no strong consensus)\n",
                tally.stay_outs, tally.boxes
            ));
        }

        prompt.push_str(
            "\nRespond ONLY with valid JSON in this exact format:\n\
             {\"decision\": \"BOX\" or \"STAY_OUT\", \"confidence\": 0.0-1.0, \"reasoning\": \"1-2 sentences\"}\n",
        );
        prompt
    }

    /// One model call, bounded by the configured timeout.
    pub async fn reason(
        &self,
        scenario: &ValidatedScenario,
        neighbors: &[Neighbor],
    ) -> StrategyResult<Decision> {
        let label = scenario.scenario().label();
        let prompt = self.build_prompt(scenario, neighbors);
        let prompt_hash = ReasoningAudit::hash(&prompt);

        debug!("Reasoning for {} with {} examples", label, neighbors.len());

        let call = self.provider.generate(
            &self.config.model,
            prompt,
            Some(self.config.system_prompt.clone()),
            self.config.options,
        );

        let (raw, failure) = match tokio::time::timeout(self.config.timeout, call).await {
            Err(_) => (None, Some(StrategyError::ReasoningTimeout(self.config.timeout))),
            Ok(Err(e)) => (None, Some(StrategyError::ReasoningUnavailable(e.to_string()))),
            Ok(Ok(text)) => (Some(text), None),
        };

        let parsed = match (&raw, failure) {
            (_, Some(err)) => Err(err),
            (Some(text), None) => parse_reasoning(text),
            (None, None) => Err(StrategyError::ReasoningUnavailable("empty response".into())),
        };

        let outcome = match &parsed {
            Ok(_) => AuditOutcome::Parsed,
            Err(StrategyError::ReasoningTimeout(_)) => AuditOutcome::Timeout,
            Err(StrategyError::ReasoningUnavailable(_)) => AuditOutcome::Unavailable,
            Err(_) => AuditOutcome::Unparseable,
        };
        let record = AuditRecord {
            scenario: label.clone(),
            prompt_hash,
            model: self.config.model.clone(),
            options: self.config.options,
            raw,
            outcome,
            recorded_at: chrono::Utc::now(),
        };
        if let Err(e) = self.audit.record(record).await {
            warn!("Failed to write reasoning audit record: {}", e);
        }

        let parsed = parsed.map_err(|e| {
            warn!("Reasoning failed for {}: {}", label, e);
            e
        })?;

        info!(
            "Reasoning for {}: {} ({:.2})",
            label, parsed.action, parsed.confidence
        );
        Ok(Decision::new(
            parsed.action,
            parsed.confidence,
            parsed.rationale.unwrap_or_else(|| MISSING_RATIONALE.to_string()),
            DecisionSource::Reasoning,
        ))
    }
}

/// Strict parse of a model answer.
///
/// Tried in order: a ```json fenced block, the outermost `{...}` span, then
/// `DECISION:` / `CONFIDENCE:` / `REASONING:` lines.
pub fn parse_reasoning(raw: &str) -> StrategyResult<ParsedReasoning> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(StrategyError::UnparseableReasoning("empty output".into()));
    }

    if let Some(block) = fenced_json(text) {
        if let Ok(v) = serde_json::from_str::<Value>(block) {
            return from_json(&v);
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                return from_json(&v);
            }
        }
    }

    match from_labelled_lines(text) {
        Ok(Some(parsed)) => Ok(parsed),
        Ok(None) => Err(StrategyError::UnparseableReasoning(format!(
            "no decision found in '{}'",
            preview(text, 80)
        ))),
        Err(e) => Err(StrategyError::UnparseableReasoning(e.to_string())),
    }
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn from_json(v: &Value) -> StrategyResult<ParsedReasoning> {
    let field = |name: &str| v.get(name).or_else(|| v.get(name.to_uppercase()));

    let decision = field("decision")
        .and_then(Value::as_str)
        .ok_or_else(|| StrategyError::UnparseableReasoning("missing 'decision'".into()))?;
    let action = Action::parse_label(decision).ok_or_else(|| {
        StrategyError::UnparseableReasoning(format!("invalid decision '{}'", decision))
    })?;

    let confidence = match field("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| StrategyError::UnparseableReasoning("missing or non-numeric 'confidence'".into()))?;

    let rationale = field("reasoning")
        .or_else(|| field("rationale"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ParsedReasoning {
        action,
        confidence: (confidence as f32).clamp(0.0, 1.0),
        rationale,
    })
}

fn from_labelled_lines(text: &str) -> Result<Option<ParsedReasoning>> {
    let Some(decision) = pattern(&DECISION_RE)?.captures(text).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    let action = Action::parse_label(decision.as_str())
        .ok_or_else(|| anyhow::anyhow!("invalid decision '{}'", decision.as_str().trim()))?;

    let confidence: f32 = pattern(&CONFIDENCE_RE)?
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .filter(|c| c.is_finite())
        .ok_or_else(|| anyhow::anyhow!("missing or non-numeric CONFIDENCE"))?;

    let rationale = pattern(&REASONING_RE)?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(Some(ParsedReasoning {
        action,
        confidence: confidence.clamp(0.0, 1.0),
        rationale,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::provider::InferenceOptions;
    use crate::race::{Scenario, Weather};
    use crate::safety::ScenarioValidator;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedProvider {
        reply: anyhow::Result<String>,
        delay: Duration,
        seen: Mutex<Vec<InferenceOptions>>,
    }

    impl FixedProvider {
        fn replying(text: &str) -> Self {
            Self { reply: Ok(text.to_string()), delay: Duration::ZERO, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LLMProvider for FixedProvider {
        async fn generate(
            &self,
            _model: &str,
            _prompt: String,
            _system: Option<String>,
            options: InferenceOptions,
        ) -> anyhow::Result<String> {
            self.seen.lock().unwrap().push(options);
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn scenario() -> ValidatedScenario {
        let s = Scenario::new("Spa", 20, 44, "INTERMEDIATE", 12, Weather::Damp).with_position(4);
        ScenarioValidator::new().validate(s).unwrap()
    }

    #[test]
    fn test_parse_plain_json() {
        let p = parse_reasoning(r#"{"decision": "BOX", "confidence": 0.72, "reasoning": "Tires gone."}"#).unwrap();
        assert_eq!(p.action, Action::Box);
        assert!((p.confidence - 0.72).abs() < 1e-6);
        assert_eq!(p.rationale.as_deref(), Some("Tires gone."));
    }

    #[test]
    fn test_parse_fenced_json_with_chatter() {
        let raw = "Let me think.\n```json\n{\"decision\": \"stay out\", \"confidence\": \"0.6\"}\n```\nDone {not json}";
        let p = parse_reasoning(raw).unwrap();
        assert_eq!(p.action, Action::StayOut);
        assert!(p.rationale.is_none());
    }

    #[test]
    fn test_parse_labelled_lines() {
        let raw = "DECISION: STAY_OUT\nCONFIDENCE: 0.55\nREASONING: Track position matters more.";
        let p = parse_reasoning(raw).unwrap();
        assert_eq!(p.action, Action::StayOut);
        assert_eq!(p.rationale.as_deref(), Some("Track position matters more."));
    }

    #[test]
    fn test_confidence_is_clipped() {
        let p = parse_reasoning(r#"{"decision": "BOX", "confidence": 1.4}"#).unwrap();
        assert_eq!(p.confidence, 1.0);
        let p = parse_reasoning("DECISION: BOX\nCONFIDENCE: -0.3").unwrap();
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_non_finite_confidence_is_unparseable() {
        let huge = format!("DECISION: BOX\nCONFIDENCE: 1{}", "0".repeat(40));
        for raw in [
            r#"{"decision": "BOX", "confidence": "NaN"}"#.to_string(),
            r#"{"decision": "BOX", "confidence": "inf"}"#.to_string(),
            r#"{"decision": "STAY_OUT", "confidence": "-infinity"}"#.to_string(),
            r#"{"decision": "BOX", "confidence": "0.8 or so"}"#.to_string(),
            huge,
        ] {
            assert!(
                matches!(parse_reasoning(&raw), Err(StrategyError::UnparseableReasoning(_))),
                "expected unparseable: {:?}",
                raw
            );
        }

        // Numeric strings are still accepted
        let p = parse_reasoning(r#"{"decision": "BOX", "confidence": " 0.65 "}"#).unwrap();
        assert!((p.confidence - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_decision_line_ignores_trailing_prose() {
        let p = parse_reasoning("DECISION: BOX - tires gone\nCONFIDENCE: 0.7").unwrap();
        assert_eq!(p.action, Action::Box);
        assert!((p.confidence - 0.7).abs() < 1e-6);

        let p = parse_reasoning("**DECISION:** stay out, the undercut won't work\nCONFIDENCE: 0.6").unwrap();
        assert_eq!(p.action, Action::StayOut);

        let p = parse_reasoning("Decision: PIT now\nConfidence: 0.8\nReasoning: Cliff incoming.").unwrap();
        assert_eq!(p.action, Action::Box);
        assert_eq!(p.rationale.as_deref(), Some("Cliff incoming."));
    }

    #[test]
    fn test_unparseable_outputs() {
        for raw in [
            "",
            "I think you should probably pit.",
            r#"{"decision": "MAYBE", "confidence": 0.5}"#,
            r#"{"decision": "BOX"}"#,
            r#"{"decision": "BOX", "confidence": "high"}"#,
            "DECISION: BOX\nno number here",
        ] {
            assert!(
                matches!(parse_reasoning(raw), Err(StrategyError::UnparseableReasoning(_))),
                "expected unparseable: {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_prompt_contains_situation_and_examples() {
        let fallback = ReasoningFallback::new(
            Arc::new(FixedProvider::replying("")),
            ReasoningConfig::default(),
        );
        let neighbor_scenario = Scenario::new("Silverstone", 30, 52, "INTERMEDIATE", 14, Weather::Damp);
        let neighbors = vec![Neighbor {
            id: "n1".into(),
            track: "Silverstone".into(),
            similarity: 0.91,
            action: Action::Box,
            rationale: "x".repeat(400),
            scenario: neighbor_scenario,
        }];
        let prompt = fallback.build_prompt(&scenario(), &neighbors);
        assert!(prompt.contains("Laps Remaining: 24"));
        assert!(prompt.contains("Race Phase: MID_RACE"));
        assert!(prompt.contains("similarity 0.91"));
        assert!(prompt.contains("1 x BOX"));
        assert!(!prompt.contains(&"x".repeat(200)));
    }

    #[tokio::test]
    async fn test_reason_uses_pinned_options_and_audits() {
        let provider = Arc::new(FixedProvider::replying(
            r#"{"decision": "BOX", "confidence": 0.7, "reasoning": "Crossover point reached."}"#,
        ));
        let fallback = ReasoningFallback::new(provider.clone(), ReasoningConfig::default());
        let d = fallback.reason(&scenario(), &[]).await.unwrap();
        assert_eq!(d.source, DecisionSource::Reasoning);
        assert_eq!(d.action, Action::Box);

        let seen = provider.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![InferenceOptions { temperature: 0.0, seed: 42 }]);

        let records = fallback.audit().records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Parsed);
        assert!(records[0].raw.as_deref().unwrap().contains("Crossover"));
    }

    #[tokio::test]
    async fn test_missing_rationale_placeholder() {
        let fallback = ReasoningFallback::new(
            Arc::new(FixedProvider::replying(r#"{"decision": "STAY_OUT", "confidence": 0.6}"#)),
            ReasoningConfig::default(),
        );
        let d = fallback.reason(&scenario(), &[]).await.unwrap();
        assert_eq!(d.rationale, MISSING_RATIONALE);
    }

    #[tokio::test]
    async fn test_timeout_is_typed_and_not_retried() {
        let provider = Arc::new(FixedProvider {
            reply: Ok("{}".into()),
            delay: Duration::from_millis(200),
            seen: Mutex::new(Vec::new()),
        });
        let config = ReasoningConfig::default().with_timeout(Duration::from_millis(20));
        let fallback = ReasoningFallback::new(provider.clone(), config);

        let err = fallback.reason(&scenario(), &[]).await.unwrap_err();
        assert!(matches!(err, StrategyError::ReasoningTimeout(_)));
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
        assert_eq!(fallback.audit().records().await[0].outcome, AuditOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_provider_failure_is_unavailable() {
        let provider = Arc::new(FixedProvider {
            reply: Err(anyhow::anyhow!("connection refused")),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        });
        let fallback = ReasoningFallback::new(provider, ReasoningConfig::default());
        let err = fallback.reason(&scenario(), &[]).await.unwrap_err();
        assert!(matches!(err, StrategyError::ReasoningUnavailable(_)));
    }

    #[tokio::test]
    async fn test_garbage_is_recorded_before_failing() {
        let fallback = ReasoningFallback::new(
            Arc::new(FixedProvider::replying("BOX BOX BOX")),
            ReasoningConfig::default(),
        );
        let err = fallback.reason(&scenario(), &[]).await.unwrap_err();
        assert_eq!(err.kind(), "UnparseableReasoning");
        let records = fallback.audit().records().await;
        assert_eq!(records[0].raw.as_deref(), Some("BOX BOX BOX"));
        assert_eq!(records[0].outcome, AuditOutcome::Unparseable);
    }
}
