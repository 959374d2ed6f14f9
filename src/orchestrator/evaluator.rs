//! Evaluator
//!
//! Runs labelled cases through the engine and aggregates the results summary
//! the dashboard reads. Cases are independent, so they run concurrently;
//! results keep input order.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::engine::DecisionEngine;
use crate::memory::golden::{dataset_name, GoldenCase};
use crate::race::{Action, DecisionSource, Scenario};

pub const HISTOGRAM_BUCKETS: usize = 10;

/// What a case is expected to produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    Action(Action),
    /// Error kind, as reported by `StrategyError::kind`
    Error(String),
}

impl Expected {
    pub fn from_label(label: &str) -> Self {
        match label {
            "BOX" => Expected::Action(Action::Box),
            "STAY_OUT" => Expected::Action(Action::StayOut),
            other => Expected::Error(other.to_string()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Expected::Action(a) => a.to_string(),
            Expected::Error(kind) => kind.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseInput {
    Scenario(Scenario),
    /// Raw record; goes through the schema step
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalCase {
    pub id: String,
    pub dataset: String,
    pub track: String,
    pub input: CaseInput,
    pub expected: Expected,
}

impl From<GoldenCase> for EvalCase {
    fn from(case: GoldenCase) -> Self {
        Self {
            id: case.id,
            dataset: case.dataset,
            track: case.scenario.track.clone(),
            input: CaseInput::Scenario(case.scenario),
            expected: Expected::Action(case.expected),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdversarialFile {
    cases: Vec<AdversarialCase>,
}

#[derive(Debug, Deserialize)]
struct AdversarialCase {
    id: String,
    scenario: Value,
    expected: String,
}

/// Load a file of `{ "cases": [{ "id", "scenario", "expected" }] }` where
/// `expected` is an action or an error kind.
pub async fn load_adversarial(path: &Path) -> Result<Vec<EvalCase>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read adversarial cases {:?}", path))?;
    let file: AdversarialFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse adversarial cases {:?}", path))?;
    let dataset = dataset_name(path);

    Ok(file
        .cases
        .into_iter()
        .map(|c| EvalCase {
            id: c.id,
            dataset: dataset.clone(),
            track: c
                .scenario
                .get("track")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            input: CaseInput::Raw(c.scenario),
            expected: Expected::from_label(&c.expected),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub id: String,
    pub dataset: String,
    pub track: String,
    pub expected: String,
    /// Action taken, or the error kind
    pub actual: String,
    pub confidence: Option<f32>,
    pub source: Option<DecisionSource>,
    pub passed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub total: usize,
    pub passing: usize,
    pub failing: usize,
    pub errored: usize,
    pub overall_accuracy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupStats {
    pub total: usize,
    pub passing: usize,
    pub accuracy: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub count: usize,
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    /// Counts per 0.1-wide bucket; 1.0 falls in the last one
    pub histogram: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub summary: Totals,
    pub per_dataset: BTreeMap<String, GroupStats>,
    pub per_track: BTreeMap<String, GroupStats>,
    pub per_source: BTreeMap<String, usize>,
    pub confidence: ConfidenceStats,
    pub errors: BTreeMap<String, usize>,
    pub cases: Vec<CaseResult>,
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

fn group_stats<'a>(results: impl Iterator<Item = (&'a str, bool)>) -> BTreeMap<String, GroupStats> {
    let mut groups: BTreeMap<String, GroupStats> = BTreeMap::new();
    for (key, passed) in results {
        let g = groups.entry(key.to_string()).or_default();
        g.total += 1;
        if passed {
            g.passing += 1;
        }
    }
    for g in groups.values_mut() {
        g.accuracy = ratio(g.passing, g.total);
    }
    groups
}

impl ResultsSummary {
    pub fn from_results(cases: Vec<CaseResult>) -> Self {
        let total = cases.len();
        let passing = cases.iter().filter(|c| c.passed).count();
        let errored = cases.iter().filter(|c| !c.passed && c.error.is_some()).count();

        let mut per_source = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for c in &cases {
            if let Some(source) = c.source {
                *per_source.entry(source.to_string()).or_insert(0) += 1;
            }
            if c.error.is_some() {
                *errors.entry(c.actual.clone()).or_insert(0) += 1;
            }
        }

        let confidences: Vec<f32> = cases.iter().filter_map(|c| c.confidence).collect();
        let mut histogram = vec![0; HISTOGRAM_BUCKETS];
        for c in &confidences {
            let bucket = ((c * HISTOGRAM_BUCKETS as f32).floor() as usize).min(HISTOGRAM_BUCKETS - 1);
            histogram[bucket] += 1;
        }
        let confidence = ConfidenceStats {
            count: confidences.len(),
            mean: if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f32>() / confidences.len() as f32
            },
            min: confidences.iter().copied().reduce(f32::min).unwrap_or(0.0),
            max: confidences.iter().copied().reduce(f32::max).unwrap_or(0.0),
            histogram,
        };

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            summary: Totals {
                total,
                passing,
                failing: total - passing - errored,
                errored,
                overall_accuracy: ratio(passing, total),
            },
            per_dataset: group_stats(cases.iter().map(|c| (c.dataset.as_str(), c.passed))),
            per_track: group_stats(cases.iter().map(|c| (c.track.as_str(), c.passed))),
            per_source,
            confidence,
            errors,
            cases,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases.iter().filter(|c| !c.passed)
    }
}

/// A case two engines answered with different actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub id: String,
    pub expected: String,
    pub baseline: String,
    pub candidate: String,
    pub candidate_confidence: Option<f32>,
}

/// Head-to-head of two evaluation runs over the same cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub baseline: Totals,
    pub candidate: Totals,
    /// Candidate accuracy minus baseline accuracy
    pub accuracy_delta: f32,
    /// Cases only the baseline got right
    pub regressions: Vec<String>,
    /// Cases only the candidate got right
    pub improvements: Vec<String>,
    /// Both produced an action and the actions differ
    pub disagreements: Vec<Disagreement>,
}

impl Comparison {
    pub fn from_summaries(baseline: &ResultsSummary, candidate: &ResultsSummary) -> Self {
        let by_id: BTreeMap<&str, &CaseResult> =
            baseline.cases.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        let mut disagreements = Vec::new();
        for cand in &candidate.cases {
            let Some(base) = by_id.get(cand.id.as_str()) else {
                continue;
            };
            match (base.passed, cand.passed) {
                (true, false) => regressions.push(cand.id.clone()),
                (false, true) => improvements.push(cand.id.clone()),
                _ => {}
            }
            if base.error.is_none() && cand.error.is_none() && base.actual != cand.actual {
                disagreements.push(Disagreement {
                    id: cand.id.clone(),
                    expected: cand.expected.clone(),
                    baseline: base.actual.clone(),
                    candidate: cand.actual.clone(),
                    candidate_confidence: cand.confidence,
                });
            }
        }

        Self {
            baseline: baseline.summary,
            candidate: candidate.summary,
            accuracy_delta: candidate.summary.overall_accuracy - baseline.summary.overall_accuracy,
            regressions,
            improvements,
            disagreements,
        }
    }
}

pub struct Evaluator {
    engine: DecisionEngine,
    concurrency: usize,
}

impl Evaluator {
    pub fn new(engine: DecisionEngine) -> Self {
        Self { engine, concurrency: 4 }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run_case(&self, case: EvalCase) -> CaseResult {
        let result = match &case.input {
            CaseInput::Scenario(s) => self.engine.decide(s.clone()).await,
            CaseInput::Raw(v) => self.engine.decide_json(v).await,
        };

        let expected = case.expected.label();
        match result {
            Ok(decision) => CaseResult {
                passed: case.expected == Expected::Action(decision.action),
                id: case.id,
                dataset: case.dataset,
                track: case.track,
                expected,
                actual: decision.action.to_string(),
                confidence: Some(decision.confidence),
                source: Some(decision.source),
                error: None,
            },
            Err(e) => CaseResult {
                passed: case.expected == Expected::Error(e.kind().to_string()),
                id: case.id,
                dataset: case.dataset,
                track: case.track,
                expected,
                actual: e.kind().to_string(),
                confidence: None,
                source: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn run(&self, cases: Vec<EvalCase>) -> ResultsSummary {
        let total = cases.len();
        info!("Evaluating {} cases (concurrency {})", total, self.concurrency);

        let results: Vec<CaseResult> = stream::iter(cases)
            .map(|case| self.run_case(case))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = ResultsSummary::from_results(results);
        info!(
            "Evaluation complete: {}/{} passing ({:.1}%), {} errored",
            summary.summary.passing,
            summary.summary.total,
            summary.summary.overall_accuracy * 100.0,
            summary.summary.errored
        );
        summary
    }

    /// Run the same cases through `baseline` and this evaluator.
    /// Returns this evaluator's summary and the head-to-head.
    pub async fn compare(&self, baseline: &Evaluator, cases: Vec<EvalCase>) -> (ResultsSummary, Comparison) {
        let base = baseline.run(cases.clone()).await;
        let summary = self.run(cases).await;
        let comparison = Comparison::from_summaries(&base, &summary);
        info!(
            "Comparison: baseline {:.1}%, candidate {:.1}%, {} disagreements",
            comparison.baseline.overall_accuracy * 100.0,
            comparison.candidate.overall_accuracy * 100.0,
            comparison.disagreements.len()
        );
        (summary, comparison)
    }
}
