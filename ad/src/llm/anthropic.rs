//! Anthropic API client implementation
//!
//! Implements the LlmClient trait over the messages API with retry and
//! backoff for transient failures. JSON-format requests steer the model
//! with a system suffix and parse the first JSON object out of the text
//! reply; tool-call replies surface as `ChatOutput::FunctionCall`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::LlmConfig;

use super::{ChatOutput, ChatRequest, ChatResponse, LlmClient, LlmError, ResponseFormat, Role, TokenUsage};

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Anthropic messages API client
pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a client from configuration; the API key comes from the env
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "AnthropicClient::from_config: called");
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("API key env var {} not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    /// Build the messages API request body
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        debug!(model = %self.model, messages = request.messages.len(), "build_request_body: called");
        let mut system = request.system.clone();
        if matches!(request.response_format, ResponseFormat::Json | ResponseFormat::JsonSchema(_)) {
            system.push_str("\n\nRespond with a single JSON object and nothing else.");
            if let ResponseFormat::JsonSchema(schema) = &request.response_format {
                system.push_str(&format!("\nThe object must match this JSON schema:\n{}", schema));
            }
        }

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role { Role::User => "user", Role::Assistant => "assistant" },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "system": system,
            "messages": messages,
            "max_tokens": request.max_tokens.min(self.max_tokens),
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if !request.tools.is_empty() {
            debug!(tool_count = request.tools.len(), "build_request_body: adding tools");
            body["tools"] = serde_json::json!(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect::<Vec<_>>()
            );
        }

        body
    }

    /// Parse the API response into a ChatOutput
    fn parse_response(&self, api: ApiResponse, format: &ResponseFormat) -> Result<ChatResponse, LlmError> {
        debug!(blocks = api.content.len(), "parse_response: called");
        let usage = TokenUsage {
            input_tokens: api.usage.input_tokens,
            output_tokens: api.usage.output_tokens,
        };

        // Tool call wins when present
        for block in &api.content {
            if block.block_type == "tool_use" {
                let name = block.name.clone().unwrap_or_default();
                debug!(%name, "parse_response: tool_use block");
                return Ok(ChatResponse {
                    output: ChatOutput::FunctionCall {
                        name,
                        arguments: block.input.clone().unwrap_or(serde_json::Value::Null),
                    },
                    usage,
                });
            }
        }

        let text: String = api
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let output = match format {
            ResponseFormat::Text => ChatOutput::Text(text),
            ResponseFormat::Json | ResponseFormat::JsonSchema(_) => {
                let value = extract_json_object(&text)
                    .ok_or_else(|| LlmError::InvalidResponse(format!("No JSON object in response: {}", truncate(&text, 200))))?;
                ChatOutput::Json(value)
            }
        };

        Ok(ChatResponse { output, usage })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        debug!(model = %self.model, "AnthropicClient::chat: called");
        let body = self.build_request_body(&request);
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                // Jitter spreads concurrent sessions' retries apart
                let jitter = Duration::from_millis(rand::random_range(0..250u64));
                debug!(attempt, ?backoff, "AnthropicClient::chat: backing off before retry");
                tokio::time::sleep(backoff + jitter).await;
                backoff *= 2;
            }

            let result = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "AnthropicClient::chat: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(60));
                debug!(?retry_after, "AnthropicClient::chat: rate limited");
                last_error = Some(LlmError::RateLimited { retry_after });
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                warn!(status, "AnthropicClient::chat: API error");
                let error = LlmError::ApiError {
                    status,
                    message: truncate(&message, 500),
                };
                if is_retryable_status(status) {
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            let api: ApiResponse = response.json().await.map_err(LlmError::Network)?;
            return self.parse_response(api, &request.response_format);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Retries exhausted".to_string())))
    }
}

/// Raw messages API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Extract the first top-level JSON object from text
///
/// Models occasionally wrap JSON in prose or code fences; scan for a
/// balanced object rather than trusting the whole body to parse.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() > limit {
        format!("{}...", &text[..limit])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_plain() {
        let value = extract_json_object("{\"a\": 1}").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_object_in_prose() {
        let text = "Here is the plan:\n```json\n{\"steps\": [{\"tool\": \"echo\"}]}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["steps"][0]["tool"], "echo");
    }

    #[test]
    fn test_extract_json_handles_braces_in_strings() {
        let text = "{\"message\": \"use {placeholder} here\"}";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["message"], "use {placeholder} here");
    }

    #[test]
    fn test_extract_json_none_without_object() {
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }
}
