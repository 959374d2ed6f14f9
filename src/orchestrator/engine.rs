//! Decision Engine
//!
//! Drives one scenario through the pipeline:
//!
//! ```text
//! VALIDATING -> RULE_CHECK -> RETRIEVAL -> REASONING -> DONE
//!      \             \            \            \
//!       +-------------+------------+------------+--> ERROR
//! ```
//!
//! Each stage either produces the decision (straight to DONE), declines
//! (next stage) or fails (ERROR). The engine keeps no per-request state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::rules::RuleLadder;
use crate::agent::{build_provider, ReasoningAudit, ReasoningFallback};
use crate::config::PitwallConfig;
use crate::error::{StrategyError, StrategyResult};
use crate::memory::{golden, ConsensusRetriever, Neighbor, ScenarioCorpus, Tally};
use crate::race::{parse_scenario, Decision, Scenario};
use crate::safety::ScenarioValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Validating,
    RuleCheck,
    Retrieval,
    Reasoning,
    Done,
    Error,
}

/// Everything the engine looked at while deciding one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub scenario_id: String,
    pub states: Vec<EngineState>,
    /// Name of the rule that fired, if any
    pub rule: Option<String>,
    pub neighbors: Vec<Neighbor>,
    pub tally: Option<Tally>,
    pub decision: Decision,
}

/// A run that ended in ERROR; `states` ends with `EngineState::Error`
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRun {
    pub scenario_id: String,
    pub states: Vec<EngineState>,
    pub error: StrategyError,
}

#[derive(Clone)]
pub struct DecisionEngine {
    validator: ScenarioValidator,
    rules: RuleLadder,
    retriever: Arc<ConsensusRetriever>,
    reasoner: Option<Arc<ReasoningFallback>>,
    rules_only: bool,
}

impl DecisionEngine {
    pub fn new(retriever: ConsensusRetriever) -> Self {
        Self {
            validator: ScenarioValidator::new(),
            rules: RuleLadder::standard(),
            retriever: Arc::new(retriever),
            reasoner: None,
            rules_only: false,
        }
    }

    pub fn with_reasoner(mut self, reasoner: ReasoningFallback) -> Self {
        self.reasoner = Some(Arc::new(reasoner));
        self
    }

    pub fn with_rules(mut self, rules: RuleLadder) -> Self {
        self.rules = rules;
        self
    }

    /// Stop after the rule ladder; a declined rule check is an error.
    /// Used as the baseline when comparing against the full pipeline.
    pub fn rules_only(mut self) -> Self {
        self.rules_only = true;
        self
    }

    pub fn retriever(&self) -> &ConsensusRetriever {
        &self.retriever
    }

    pub fn reasoner(&self) -> Option<&ReasoningFallback> {
        self.reasoner.as_deref()
    }

    /// Assemble an engine from configuration: embedder, corpus, provider.
    pub async fn from_config(config: &PitwallConfig) -> Result<Self> {
        let embedder = config.embedder.build()?;

        let snapshot = config.corpus_snapshot.as_ref().filter(|p| p.exists());
        let corpus = match snapshot {
            Some(path) => {
                let corpus = ScenarioCorpus::load_snapshot(path).await?;
                if corpus.embedder_name() != embedder.name() {
                    anyhow::bail!(
                        "Corpus snapshot {:?} was built with the '{}' embedder, configured embedder is '{}'",
                        path,
                        corpus.embedder_name(),
                        embedder.name()
                    );
                }
                corpus
            }
            None => {
                let cases = golden::load_golden_dir(&config.golden_dir)
                    .await
                    .context("Failed to load golden datasets for the corpus")?;
                ScenarioCorpus::build(&cases, embedder.as_ref())?
            }
        };

        let retriever = ConsensusRetriever::with_config(embedder, corpus, config.retriever());
        let mut engine = Self::new(retriever);

        if let Some(provider) =
            build_provider(config.provider, config.provider_url.as_deref(), config.api_key.clone())?
        {
            let audit = match &config.audit_log {
                Some(path) => ReasoningAudit::with_sink(path),
                None => ReasoningAudit::new(),
            };
            engine = engine.with_reasoner(ReasoningFallback::with_audit(
                provider,
                config.reasoning(),
                Arc::new(audit),
            ));
        }

        Ok(engine)
    }

    pub async fn decide(&self, scenario: Scenario) -> StrategyResult<Decision> {
        self.decide_traced(scenario).await.map(|trace| trace.decision)
    }

    /// Schema check on a raw record, then `decide`
    pub async fn decide_json(&self, value: &Value) -> StrategyResult<Decision> {
        let scenario = parse_scenario(value).map_err(|e| {
            warn!("Rejected scenario record: {}", e);
            e
        })?;
        self.decide(scenario).await
    }

    pub async fn decide_traced(&self, scenario: Scenario) -> StrategyResult<DecisionTrace> {
        self.trace(scenario).await.map_err(|failed| failed.error)
    }

    /// Like `decide_traced`, but a failed run keeps the states it visited
    pub async fn trace(&self, scenario: Scenario) -> Result<DecisionTrace, FailedRun> {
        let label = scenario.label();
        let span = info_span!("decide", scenario = %label);
        let mut states = Vec::new();
        let result = self
            .run(scenario, label.clone(), &mut states)
            .instrument(span)
            .await;
        match result {
            Ok(trace) => {
                info!(
                    "{} -> {} ({:.2}, {})",
                    label, trace.decision.action, trace.decision.confidence, trace.decision.source
                );
                Ok(trace)
            }
            Err(error) => {
                if let Some(from) = states.last() {
                    debug!("{:?} -> {:?}: {}", from, EngineState::Error, error.kind());
                }
                warn!("{} -> {} ({})", label, error.kind(), error);
                states.push(EngineState::Error);
                Err(FailedRun { scenario_id: label, states, error })
            }
        }
    }

    async fn run(
        &self,
        scenario: Scenario,
        label: String,
        states: &mut Vec<EngineState>,
    ) -> StrategyResult<DecisionTrace> {
        states.push(EngineState::Validating);
        let validated = self.validator.validate(scenario)?;

        states.push(EngineState::RuleCheck);
        if let Some(decision) = self.rules.apply(&validated) {
            states.push(EngineState::Done);
            return Ok(DecisionTrace {
                scenario_id: label,
                states: std::mem::take(states),
                rule: self.rules.matching_rule(&validated).map(str::to_string),
                neighbors: Vec::new(),
                tally: None,
                decision,
            });
        }
        if self.rules_only {
            return Err(StrategyError::ReasoningUnavailable(
                "rule ladder declined and later stages are disabled".to_string(),
            ));
        }

        states.push(EngineState::Retrieval);
        let outcome = self.retriever.retrieve(validated.scenario())?;
        if let Some(decision) = outcome.decision {
            states.push(EngineState::Done);
            return Ok(DecisionTrace {
                scenario_id: label,
                states: std::mem::take(states),
                rule: None,
                neighbors: outcome.neighbors,
                tally: Some(outcome.tally),
                decision,
            });
        }

        states.push(EngineState::Reasoning);
        let reasoner = self.reasoner.as_ref().ok_or_else(|| {
            StrategyError::ReasoningUnavailable("no reasoning provider configured".to_string())
        })?;
        debug!("Rules and retrieval declined; falling back to reasoning");
        let decision = reasoner.reason(&validated, &outcome.neighbors).await?;

        states.push(EngineState::Done);
        Ok(DecisionTrace {
            scenario_id: label,
            states: std::mem::take(states),
            rule: None,
            neighbors: outcome.neighbors,
            tally: Some(outcome.tally),
            decision,
        })
    }
}
