use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::InferenceOptions;

pub const DEFAULT_MODEL: &str = "llama3.2:3b";

/// Backend used for the reasoning fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Ollama,
    #[serde(alias = "openai_compatible")]
    Openai,
    /// No reasoner; rules and retrieval only
    None,
}

impl ProviderKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "ollama" => Some(ProviderKind::Ollama),
            "openai" | "openai_compatible" | "vllm" => Some(ProviderKind::Openai),
            "none" | "off" | "disabled" => Some(ProviderKind::None),
            _ => None,
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::Openai => "http://localhost:8000/v1",
            ProviderKind::None => "",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Openai => write!(f, "openai"),
            ProviderKind::None => write!(f, "none"),
        }
    }
}

/// Configuration for the reasoning fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub model: String,
    pub system_prompt: String,
    pub options: InferenceOptions,
    pub timeout: Duration,
    /// Characters of each neighbour's rationale shown in the prompt
    pub example_rationale_chars: usize,
}

impl ReasoningConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: InferenceOptions) -> Self {
        self.options = options;
        self
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: "You are an expert Formula 1 race strategist on the pit wall. \
                You decide whether a car should BOX (pit now) or STAY_OUT (continue the stint). \
                Weigh tire degradation against laps remaining, track position and the race state. \
                Answer only in the JSON format you are given."
                .to_string(),
            options: InferenceOptions::default(),
            timeout: Duration::from_secs(30),
            example_rationale_chars: 150,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_labels() {
        assert_eq!(ProviderKind::from_label("vLLM"), Some(ProviderKind::Openai));
        assert_eq!(ProviderKind::from_label("off"), Some(ProviderKind::None));
        assert_eq!(ProviderKind::from_label("gemini"), None);
    }

    #[test]
    fn test_reasoning_config_defaults() {
        let config = ReasoningConfig::new("qwen3:8b");
        assert_eq!(config.model, "qwen3:8b");
        assert_eq!(config.options.temperature, 0.0);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.system_prompt.contains("STAY_OUT"));
    }
}
