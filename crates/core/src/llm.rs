use crate::error::LlmError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            api_key: String::new(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

pub struct ChatCompletionsClient {
    config: LlmConfig,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Configuration(
                "language model API key must not be empty".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::Configuration(
                "language model name must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(model = %self.config.model, prompt_len = prompt.len(), "chat completion request");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest {
                model: &self.config.model,
                messages: [ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: self.config.temperature,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let details = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendResponse { status, details });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}
