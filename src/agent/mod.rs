//! Agent Module
//!
//! Language-model access for the reasoning fallback: providers, the
//! fallback stage itself and the audit log of raw generations.

mod types;
mod provider;
pub mod audit;
pub mod reasoning;

pub use types::{ProviderKind, ReasoningConfig, DEFAULT_MODEL};
pub use provider::{InferenceOptions, LLMProvider, OllamaProvider, OpenAICompatibleProvider};
pub use audit::{AuditOutcome, AuditRecord, ReasoningAudit};
pub use reasoning::{parse_reasoning, ParsedReasoning, ReasoningFallback};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Provider for `kind`, or `None` when reasoning is disabled
pub fn build_provider(
    kind: ProviderKind,
    url: Option<&str>,
    api_key: Option<String>,
) -> Result<Option<Arc<dyn LLMProvider>>> {
    let url = url.unwrap_or_else(|| kind.default_url());
    let provider: Arc<dyn LLMProvider> = match kind {
        ProviderKind::None => return Ok(None),
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_url(url)?),
        ProviderKind::Openai => Arc::new(OpenAICompatibleProvider::new(url.to_string(), api_key)),
    };
    info!("Reasoning provider: {} at {}", kind, url);
    Ok(Some(provider))
}
