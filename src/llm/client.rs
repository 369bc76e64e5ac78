//! HTTP client for OpenAI-compatible chat-completions endpoints.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// A message in a chat-completions request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for a chat-completions call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier to use for generation.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0). Higher values = more random.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a new request with default sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response body from a chat-completions call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated choices/completions.
    pub choices: Vec<Choice>,
}

impl ChatResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Generated message.
    pub message: Message,
}

/// The pipeline's seam to the text-generation backend.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate text for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Client for OpenAI-compatible chat-completions APIs.
pub struct HttpGenerationClient {
    /// Base URL for the API.
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// Model to use for requests.
    model: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl HttpGenerationClient {
    /// Create a new client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the API (e.g., "http://localhost:4000/v1")
    /// * `api_key` - Optional API key for authentication
    /// * `model` - Model identifier to use for all requests
    pub fn new(api_base: String, api_key: Option<String>, model: String) -> Self {
        Self {
            api_base,
            api_key,
            model,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create a new client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `GENERATION_API_BASE`: Base URL for the API (required)
    /// - `GENERATION_API_KEY`: API key for authentication (optional)
    /// - `GENERATION_MODEL`: Model identifier (defaults to "gpt-4o-mini")
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::MissingApiBase` if `GENERATION_API_BASE` is
    /// not set.
    pub fn from_env() -> Result<Self, GenerationError> {
        let api_base =
            env::var("GENERATION_API_BASE").map_err(|_| GenerationError::MissingApiBase)?;
        let api_key = env::var("GENERATION_API_KEY").ok();
        let model = env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self::new(api_base, api_key, model))
    }

    /// Returns the configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest::new(&self.model, vec![Message::user(prompt)]);

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(Duration::from_secs(120))
            } else {
                GenerationError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        body.first_content()
            .map(str::to_owned)
            .ok_or_else(|| GenerationError::ParseError("response contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let sys = Message::system("You are terse.");
        assert_eq!(sys.role, "system");

        let user = Message::user("hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "hello");
    }

    #[test]
    fn test_request_omits_unset_sampling_params() {
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        let json = serde_json::to_value(&request).expect("serialization should work");

        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());

        let request = request.with_temperature(0.7).with_max_tokens(256);
        let json = serde_json::to_value(&request).expect("serialization should work");
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn test_response_first_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello world"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).expect("parse should work");
        assert_eq!(response.first_content(), Some("hello world"));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("parse");
        assert!(empty.first_content().is_none());
    }
}
