//! Async HTTP client for OpenAI-compatible chat completion endpoints.

use super::ChatEndpoint;
use crate::Message;
use crate::error::{ConfigError, EndpointError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TEMPERATURE: f64 = 0.1;

/// Wire shape of one chat completion request.
#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    #[serde(default)]
    choices: Vec<RawChoice>,
    error: Option<RawApiError>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawReplyMessage,
}

#[derive(Deserialize, Debug)]
struct RawReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawApiError {
    message: String,
}

/// A [`ChatEndpoint`] backed by an OpenAI-compatible `/chat/completions`
/// route.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
}

impl ChatClient {
    /// Create a client for the given model against the default base URL.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent("promptloom/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        })
    }

    /// Point the client at a different OpenAI-compatible base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatEndpoint for ChatClient {
    async fn chat(&self, messages: &[Message]) -> Result<Message, EndpointError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!(
            "LLM request: model={}, messages={}, temp={}",
            self.model,
            messages.len(),
            self.temperature,
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| EndpointError::Other(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| EndpointError::Other(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if status.as_u16() == 429 {
            return Err(EndpointError::RateLimited(text));
        }
        if !status.is_success() {
            return Err(EndpointError::Other(format!(
                "chat API HTTP {status}: {text}"
            )));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| EndpointError::Other(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            // Some providers report rate limits with a 200 and an error body.
            if err.message.to_lowercase().contains("rate limit") {
                return Err(EndpointError::RateLimited(err.message));
            }
            return Err(EndpointError::Other(format!("chat API error: {}", err.message)));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EndpointError::Other("response carried no choices".to_string()))?;

        Ok(Message::assistant(content))
    }
}
