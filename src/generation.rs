//! Language-model providers.
//!
//! - **[`OpenAICompatibleModel`]**: `POST {url}/chat/completions` against any
//!   OpenAI-compatible API (OpenAI, Together, vLLM, llama.cpp server, ...).
//! - **[`OllamaModel`]**: `POST {url}/api/generate` on an Ollama instance.
//! - **[`DisabledModel`]**: fails every request.
//!
//! The prompt is sent as a single user message. Generation is not retried.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use agentkb_core::generation::{GenerationModel, GenerationParams};

use crate::config::GenerationConfig;
use crate::http::{post_json, RetryPolicy};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn required_model(config: &GenerationConfig) -> Result<String> {
    config.model.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "generation.model required for provider '{}'",
            config.provider
        )
    })
}

pub struct DisabledModel;

#[async_trait]
impl GenerationModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

pub struct OpenAICompatibleModel {
    client: reqwest::Client,
    model: String,
    url: String,
    /// Empty for endpoints that need no auth.
    api_key: String,
}

impl OpenAICompatibleModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = required_model(config)?;
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                env = %config.api_key_env,
                "API key variable not set; sending unauthenticated requests"
            );
        }
        Ok(Self {
            client: http_client(config)?,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl GenerationModel for OpenAICompatibleModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
        });
        let bearer = (!self.api_key.is_empty()).then_some(self.api_key.as_str());
        let json = post_json(
            &self.client,
            &endpoint,
            bearer,
            &body,
            RetryPolicy::once(),
            "chat completions",
        )
        .await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

pub struct OllamaModel {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: required_model(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
        })
    }
}

#[async_trait]
impl GenerationModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
            },
        });
        let json = post_json(
            &self.client,
            &endpoint,
            None,
            &body,
            RetryPolicy::once(),
            "Ollama",
        )
        .await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
    }
}

/// Create the model named by `generation.provider`.
pub fn create_model(config: &GenerationConfig) -> Result<Arc<dyn GenerationModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAICompatibleModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
