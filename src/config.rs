//! Configuration
//!
//! Defaults, then an optional YAML file, then `PITWALL_*` environment
//! variables. CLI flags are applied last by the binaries.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::{InferenceOptions, ProviderKind, ReasoningConfig, DEFAULT_MODEL};
use crate::memory::{EmbedderKind, RetrieverConfig};

pub const CONFIG_ENV: &str = "PITWALL_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitwallConfig {
    pub golden_dir: PathBuf,
    /// Prebuilt corpus; when absent or missing the golden directory is embedded at start
    pub corpus_snapshot: Option<PathBuf>,
    pub embedder: EmbedderKind,
    pub top_k: usize,
    pub consensus_threshold: f32,
    pub confidence_floor: f32,
    pub confidence_ceiling: f32,
    pub provider: ProviderKind,
    pub provider_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub seed: i32,
    pub reasoning_timeout_secs: u64,
    pub audit_log: Option<PathBuf>,
    pub eval_concurrency: usize,
    pub results_path: PathBuf,
}

impl Default for PitwallConfig {
    fn default() -> Self {
        let retriever = RetrieverConfig::default();
        let options = InferenceOptions::default();
        Self {
            golden_dir: PathBuf::from("datasets/golden"),
            corpus_snapshot: None,
            embedder: EmbedderKind::default(),
            top_k: retriever.top_k,
            consensus_threshold: retriever.consensus_threshold,
            confidence_floor: retriever.confidence_floor,
            confidence_ceiling: retriever.confidence_ceiling,
            provider: ProviderKind::default(),
            provider_url: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: options.temperature,
            seed: options.seed,
            reasoning_timeout_secs: 30,
            audit_log: None,
            eval_concurrency: 4,
            results_path: PathBuf::from("results/summary.json"),
        }
    }
}

impl PitwallConfig {
    /// Full load: `path` (or `$PITWALL_CONFIG`) if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => Self::from_yaml_file(&p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.check()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overlay `PITWALL_*` values looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, value: String) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{}='{}': {}", key, value, e))
        }

        if let Some(v) = var("PITWALL_GOLDEN_DIR") {
            self.golden_dir = PathBuf::from(v);
        }
        if let Some(v) = var("PITWALL_CORPUS_SNAPSHOT") {
            self.corpus_snapshot = Some(PathBuf::from(v));
        }
        if let Some(v) = var("PITWALL_EMBEDDER") {
            self.embedder = EmbedderKind::from_label(&v)
                .with_context(|| format!("PITWALL_EMBEDDER: unknown embedder '{}'", v))?;
        }
        if let Some(v) = var("PITWALL_TOP_K") {
            self.top_k = parsed("PITWALL_TOP_K", v)?;
        }
        if let Some(v) = var("PITWALL_CONSENSUS_THRESHOLD") {
            self.consensus_threshold = parsed("PITWALL_CONSENSUS_THRESHOLD", v)?;
        }
        if let Some(v) = var("PITWALL_PROVIDER") {
            self.provider = ProviderKind::from_label(&v)
                .with_context(|| format!("PITWALL_PROVIDER: unknown provider '{}'", v))?;
        }
        if let Some(v) = var("PITWALL_PROVIDER_URL") {
            self.provider_url = Some(v);
        }
        if let Some(v) = var("PITWALL_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = var("PITWALL_MODEL") {
            self.model = v;
        }
        if let Some(v) = var("PITWALL_TEMPERATURE") {
            self.temperature = parsed("PITWALL_TEMPERATURE", v)?;
        }
        if let Some(v) = var("PITWALL_SEED") {
            self.seed = parsed("PITWALL_SEED", v)?;
        }
        if let Some(v) = var("PITWALL_REASONING_TIMEOUT_SECS") {
            self.reasoning_timeout_secs = parsed("PITWALL_REASONING_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = var("PITWALL_AUDIT_LOG") {
            self.audit_log = Some(PathBuf::from(v));
        }
        if let Some(v) = var("PITWALL_EVAL_CONCURRENCY") {
            self.eval_concurrency = parsed("PITWALL_EVAL_CONCURRENCY", v)?;
        }
        if let Some(v) = var("PITWALL_RESULTS_PATH") {
            self.results_path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn check(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if !(0.5..=1.0).contains(&self.consensus_threshold) {
            bail!("consensus_threshold {} outside 0.5..=1.0", self.consensus_threshold);
        }
        for (name, value) in [
            ("confidence_floor", self.confidence_floor),
            ("confidence_ceiling", self.confidence_ceiling),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} {} outside 0.0..=1.0", name, value);
            }
        }
        if self.confidence_floor > self.confidence_ceiling {
            bail!(
                "confidence band [{}, {}] is inverted",
                self.confidence_floor,
                self.confidence_ceiling
            );
        }
        if self.reasoning_timeout_secs == 0 {
            bail!("reasoning_timeout_secs must be positive");
        }
        if self.eval_concurrency == 0 {
            bail!("eval_concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn retriever(&self) -> RetrieverConfig {
        RetrieverConfig {
            top_k: self.top_k,
            consensus_threshold: self.consensus_threshold,
            confidence_floor: self.confidence_floor,
            confidence_ceiling: self.confidence_ceiling,
        }
    }

    pub fn reasoning(&self) -> ReasoningConfig {
        ReasoningConfig::new(self.model.clone())
            .with_options(InferenceOptions {
                temperature: self.temperature,
                seed: self.seed,
            })
            .with_timeout(Duration::from_secs(self.reasoning_timeout_secs))
    }
}
