//! HTTP clients for the supported model providers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rfpflow_core::config::{LlmProvider, ProviderConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::llm::{Completion, CompletionRequest, LlmClient};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Builds the client for one configured tier.
pub fn build_client(config: &ProviderConfig, timeout_secs: u64) -> Result<Arc<dyn LlmClient>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .context("failed to build HTTP client")?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiClient {
            http,
            api_key: required_key(config)?,
            model: config.model.clone(),
            base_url: base_url(config, OPENAI_BASE_URL),
        }),
        LlmProvider::Anthropic => Arc::new(AnthropicClient {
            http,
            api_key: required_key(config)?,
            model: config.model.clone(),
            base_url: base_url(config, ANTHROPIC_BASE_URL),
        }),
        LlmProvider::Ollama => Arc::new(OllamaClient {
            http,
            model: config.model.clone(),
            base_url: base_url(config, OLLAMA_BASE_URL),
        }),
    };

    Ok(client)
}

fn required_key(config: &ProviderConfig) -> Result<SecretString> {
    config
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("{} provider requires an api key", config.provider.as_str()))
}

fn base_url(config: &ProviderConfig, default: &str) -> String {
    config.base_url.as_deref().unwrap_or(default).trim_end_matches('/').to_string()
}

async fn error_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_else(|_| "unreadable error body".to_string())
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    total_tokens: u32,
}

fn chat_messages(request: &CompletionRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system_prompt.as_deref() {
        messages.push(ChatMessage { role: "system", content: system });
    }
    messages.push(ChatMessage { role: "user", content: &request.prompt });
    messages
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> &str {
        LlmProvider::OpenAi.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = OpenAiRequest {
            model: &self.model,
            messages: chat_messages(request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("openai request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("openai returned {status}: {}", error_body(response).await);
        }

        let parsed: OpenAiResponse =
            response.json().await.context("openai response was not valid json")?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("openai returned no choices"))?;

        Ok(Completion { text, tokens_used: parsed.usage.map(|usage| usage.total_tokens) })
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicUsage {
    fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        LlmProvider::Anthropic.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = AnthropicRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: &request.prompt }],
            system: request.system_prompt.as_deref(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("anthropic returned {status}: {}", error_body(response).await);
        }

        let parsed: AnthropicResponse =
            response.json().await.context("anthropic response was not valid json")?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            tokens_used: parsed.usage.as_ref().map(AnthropicUsage::total),
        })
    }
}

pub struct OllamaClient {
    http: reqwest::Client,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        LlmProvider::Ollama.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = OllamaRequest {
            model: &self.model,
            messages: chat_messages(request),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("ollama request failed; is the server running?")?;

        let status = response.status();
        if !status.is_success() {
            bail!("ollama returned {status}: {}", error_body(response).await);
        }

        let parsed: OllamaResponse =
            response.json().await.context("ollama response was not valid json")?;
        let tokens_used = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            _ => None,
        };

        Ok(Completion { text: parsed.message.content, tokens_used })
    }
}
