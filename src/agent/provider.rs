use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Sampling parameters pinned for every call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceOptions {
    pub temperature: f32,
    pub seed: i32,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self { temperature: 0.0, seed: 42 }
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        prompt: String,
        system: Option<String>,
        options: InferenceOptions,
    ) -> Result<String>;
}

pub struct OllamaProvider {
    client: ollama_rs::Ollama,
}

impl OllamaProvider {
    pub fn new(client: ollama_rs::Ollama) -> Self {
        Self { client }
    }

    /// Parse `http://host:port` into an Ollama client
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid Ollama URL '{}'", url))?;
        let host = format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().context("Ollama URL has no host")?
        );
        let port = parsed.port().unwrap_or(11434);
        Ok(Self::new(ollama_rs::Ollama::new(host, port)))
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn generate(
        &self,
        model: &str,
        prompt: String,
        system: Option<String>,
        options: InferenceOptions,
    ) -> Result<String> {
        use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};
        use ollama_rs::models::ModelOptions;

        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(ChatMessage::system(sys));
        }
        messages.push(ChatMessage::user(prompt));

        let model_options = ModelOptions::default()
            .temperature(options.temperature)
            .seed(options.seed);

        let res = self
            .client
            .send_chat_messages(
                ChatMessageRequest::new(model.to_string(), messages).options(model_options),
            )
            .await?;

        Ok(res.message.content)
    }
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate(
        &self,
        model: &str,
        prompt: String,
        system: Option<String>,
        options: InferenceOptions,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({ "role": "system", "content": sys }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
            "seed": options.seed,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?.error_for_status()?;
        let json: serde_json::Value = res.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("Failed to parse content from OpenAI response")?;

        Ok(content.to_string())
    }
}
