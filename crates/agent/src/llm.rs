use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use leadline_core::autopilot::{ChatMessage, ChatRole};
use leadline_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 512;

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat Completions API client; also serves Ollama's OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    http: Client,
    name: &'static str,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        http: Client,
        name: &'static str,
        base_url: &str,
        api_key: Option<SecretString>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            name,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut request = self.http.post(&self.endpoint).json(&openai_request_body(&self.model, messages));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{} request failed", self.name))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", self.name))?;
        let body: Value = response.json().await.context("completion body is not JSON")?;
        extract_openai_text(&body)
    }
}

pub struct AnthropicClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl AnthropicClient {
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&anthropic_request_body(&self.model, messages))
            .send()
            .await
            .context("anthropic request failed")?
            .error_for_status()
            .context("anthropic returned an error status")?;
        let body: Value = response.json().await.context("completion body is not JSON")?;
        extract_anthropic_text(&body)
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .context("failed to build llm http client")?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiCompatibleClient::new(
            http,
            "openai",
            config.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_BASE_URL),
            config.api_key.clone(),
            config.model.clone(),
        )),
        LlmProvider::Ollama => {
            let base_url = config.base_url.as_deref().unwrap_or("http://localhost:11434");
            Arc::new(OpenAiCompatibleClient::new(
                http,
                "ollama",
                &format!("{}/v1", base_url.trim_end_matches('/')),
                None,
                config.model.clone(),
            ))
        }
        LlmProvider::Anthropic => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow!("llm.api_key is required for the anthropic provider"))?;
            Arc::new(AnthropicClient::new(
                http,
                config.base_url.as_deref().unwrap_or(ANTHROPIC_DEFAULT_BASE_URL),
                api_key,
                config.model.clone(),
            ))
        }
    };
    Ok(client)
}

fn openai_request_body(model: &str, messages: &[ChatMessage]) -> Value {
    let messages = messages
        .iter()
        .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
        .collect::<Vec<_>>();

    json!({
        "model": model,
        "messages": messages,
        "temperature": 0.2,
        "max_tokens": MAX_OUTPUT_TOKENS,
        "response_format": { "type": "json_object" },
    })
}

/// Anthropic takes system turns as a separate top-level field.
fn anthropic_request_body(model: &str, messages: &[ChatMessage]) -> Value {
    let system = messages
        .iter()
        .filter(|message| message.role == ChatRole::System)
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let turns = messages
        .iter()
        .filter(|message| message.role != ChatRole::System)
        .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
        .collect::<Vec<_>>();

    json!({
        "model": model,
        "max_tokens": MAX_OUTPUT_TOKENS,
        "system": system,
        "messages": turns,
    })
}

fn extract_openai_text(body: &Value) -> Result<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("completion response has no choices[0].message.content"))
}

fn extract_anthropic_text(body: &Value) -> Result<String> {
    let text = body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(anyhow!("anthropic response has no text content"));
    }
    Ok(text)
}
