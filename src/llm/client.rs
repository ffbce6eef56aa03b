use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::retry::{with_retry, RetryConfig};
use super::validation::validate_against_schema;
use crate::error::LlmError;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const JSON_TOOL_NAME: &str = "submit_json";

/// Average characters per token used for estimates
pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token count; never zero for non-empty text
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// One generation call: prompt, sampling settings and an optional response schema
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f64,
    /// Falls back to the client's configured maximum
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    /// JSON Schema the response must satisfy (JSON generation only)
    pub schema: Option<Value>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.1,
            max_tokens: None,
            timeout: Duration::from_secs(120),
            schema: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Text and JSON generation capability consumed by the pipeline stages.
///
/// Implementations own their retry policy and must be safe to share
/// across concurrent map tasks.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<String, LlmError>;

    /// Generate a JSON object; schema violations surface as [`LlmError::Validation`]
    async fn generate_json(&self, request: &GenerationRequest) -> Result<Map<String, Value>, LlmError>;

    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    /// Identifier of the underlying model, used in cache keys
    fn model_name(&self) -> &str;
}

/// Configuration for the Anthropic API client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY env var)
    pub api_key: String,
    /// Model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,
    /// Maximum tokens in response unless the request says otherwise
    pub max_tokens: u32,
    pub retry: RetryConfig,
}

impl AnthropicConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
        let model = std::env::var("ANTHROPIC_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

        Ok(Self::new(api_key, model))
    }

    /// Create with custom settings
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            max_tokens: 4096,
            retry: RetryConfig::default(),
        }
    }
}

/// Anthropic Messages API client
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn messages(request: &GenerationRequest) -> Vec<Message> {
        vec![Message {
            role: "user".to_string(),
            content: request.prompt.clone(),
        }]
    }

    async fn post<B: Serialize>(&self, body: &B, timeout: Duration) -> Result<AnthropicResponse, LlmError> {
        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::invalid_response(format!("failed to parse response body: {}", e)))
    }

    async fn send_text(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let body = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: Some(request.temperature),
            system: request.system.clone(),
            messages: Self::messages(request),
        };

        let response = self.post(&body, request.timeout).await?;
        response
            .first_text()
            .ok_or_else(|| LlmError::invalid_response("no text content in response"))
    }

    async fn send_with_tool(&self, request: &GenerationRequest) -> Result<Map<String, Value>, LlmError> {
        let tool = Tool {
            name: JSON_TOOL_NAME.to_string(),
            description: "Submit the requested result as a single JSON object".to_string(),
            input_schema: request
                .schema
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        };

        let body = AnthropicToolRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: Some(request.temperature),
            system: request.system.clone(),
            messages: Self::messages(request),
            tools: vec![tool],
            tool_choice: Some(ToolChoice {
                choice_type: "tool".to_string(),
                name: JSON_TOOL_NAME.to_string(),
            }),
        };

        let response = self.post(&body, request.timeout).await?;
        response.tool_input(JSON_TOOL_NAME)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        with_retry(&self.config.retry, "generate_text", || self.send_text(request)).await
    }

    async fn generate_json(&self, request: &GenerationRequest) -> Result<Map<String, Value>, LlmError> {
        let object = with_retry(&self.config.retry, "generate_json", || self.send_with_tool(request)).await?;
        if let Some(schema) = &request.schema {
            validate_against_schema(&Value::Object(object.clone()), schema)?;
        }
        Ok(object)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(timeout)
    } else if error.is_connect() || error.is_request() {
        LlmError::Connection {
            message: error.to_string(),
        }
    } else {
        LlmError::invalid_response(error.to_string())
    }
}

/// Map a non-success HTTP status onto the retry taxonomy
fn classify_status(status: u16, body: String) -> LlmError {
    match status {
        429 => LlmError::RateLimited { message: body },
        500..=599 => LlmError::Server { status, body },
        _ => LlmError::Api { status, body },
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct AnthropicToolRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

impl AnthropicResponse {
    fn first_text(&self) -> Option<String> {
        self.content
            .iter()
            .find(|block| block.content_type == "text")
            .map(|block| block.text.clone())
    }

    fn tool_input(&self, tool_name: &str) -> Result<Map<String, Value>, LlmError> {
        let input = self
            .content
            .iter()
            .find(|block| block.content_type == "tool_use" && block.name.as_deref() == Some(tool_name))
            .and_then(|block| block.input.clone())
            .ok_or_else(|| LlmError::invalid_response("no tool_use response found"))?;

        match input {
            Value::Object(object) => Ok(object),
            other => Err(LlmError::invalid_response(format!(
                "tool input is not a JSON object: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("äöüß"), 1);
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(429, String::new()), LlmError::RateLimited { .. }));
        assert!(matches!(classify_status(529, String::new()), LlmError::Server { status: 529, .. }));
        assert!(matches!(classify_status(400, String::new()), LlmError::Api { status: 400, .. }));
    }

    #[test]
    fn test_tool_request_serialization() {
        let request = AnthropicToolRequest {
            model: "m".to_string(),
            max_tokens: 10,
            temperature: Some(0.2),
            system: None,
            messages: vec![Message {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            tools: vec![],
            tool_choice: Some(ToolChoice {
                choice_type: "tool".to_string(),
                name: JSON_TOOL_NAME.to_string(),
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("system").is_none());
        assert_eq!(value["tool_choice"], json!({"type": "tool", "name": "submit_json"}));
    }

    #[test]
    fn test_extract_tool_input() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Here you go"},
                {"type": "tool_use", "name": "submit_json", "input": {"summary": "ok"}}
            ]
        }))
        .unwrap();

        assert_eq!(response.first_text().as_deref(), Some("Here you go"));
        let object = response.tool_input(JSON_TOOL_NAME).unwrap();
        assert_eq!(object.get("summary"), Some(&json!("ok")));
    }

    #[test]
    fn test_missing_tool_input_is_invalid_response() {
        let response: AnthropicResponse =
            serde_json::from_value(json!({"content": [{"type": "text", "text": "no tool"}]})).unwrap();
        let error = response.tool_input(JSON_TOOL_NAME).unwrap_err();
        assert!(matches!(error, LlmError::InvalidResponse { .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("prompt")
            .with_system("system")
            .with_temperature(0.3)
            .with_timeout(Duration::from_secs(5))
            .with_schema(json!({"type": "object"}));
        assert_eq!(request.system.as_deref(), Some("system"));
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.timeout, Duration::from_secs(5));
        assert!(request.max_tokens.is_none());
    }
}
