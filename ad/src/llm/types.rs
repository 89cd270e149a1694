//! LLM request/response types

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Expected response shape
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseFormat {
    /// Free text
    #[default]
    Text,
    /// A single JSON object
    Json,
    /// A JSON object matching the given schema
    JsonSchema(serde_json::Value),
}

/// A callable tool surface exposed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One chat request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// System prompt
    pub system: String,

    /// Conversation messages
    pub messages: Vec<Message>,

    /// Sampling temperature, when set
    pub temperature: Option<f32>,

    /// Response token ceiling
    pub max_tokens: u32,

    /// Expected response shape
    pub response_format: ResponseFormat,

    /// Tools the model may call
    pub tools: Vec<ToolSchema>,
}

impl ChatRequest {
    /// Create a request with defaults (text format, 4096 tokens)
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: 4096,
            response_format: ResponseFormat::Text,
            tools: Vec::new(),
        }
    }

    /// Builder: append a message
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Builder: expect a JSON object back
    pub fn expecting_json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }

    /// Builder: set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Builder: set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token accounting for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Accumulate another usage into this one
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// What the model returned
#[derive(Debug, Clone)]
pub enum ChatOutput {
    /// Final free text
    Text(String),
    /// A parsed JSON object (response_format was json/json_schema)
    Json(serde_json::Value),
    /// A function call with its argument object
    FunctionCall { name: String, arguments: serde_json::Value },
}

impl ChatOutput {
    /// The JSON value, when the output is JSON
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ChatOutput::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, when the output is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChatOutput::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One chat response
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub output: ChatOutput,
    pub usage: TokenUsage,
}

impl ChatResponse {
    /// Convenience: a plain text response with zero usage (tests)
    pub fn text(content: impl Into<String>) -> Self {
        debug!("ChatResponse::text: called");
        Self {
            output: ChatOutput::Text(content.into()),
            usage: TokenUsage::default(),
        }
    }

    /// Convenience: a JSON response with zero usage (tests)
    pub fn json(value: serde_json::Value) -> Self {
        debug!("ChatResponse::json: called");
        Self {
            output: ChatOutput::Json(value),
            usage: TokenUsage::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::new("you are a planner")
            .with_message(Message::user("plan this"))
            .expecting_json()
            .with_max_tokens(1024);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.response_format, ResponseFormat::Json);
        assert_eq!(request.max_tokens, 1024);
    }

    #[test]
    fn test_token_usage_add() {
        let mut usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        };
        usage.add(TokenUsage {
            input_tokens: 3,
            output_tokens: 7,
        });
        assert_eq!(usage.input_tokens, 13);
        assert_eq!(usage.output_tokens, 12);
    }

    #[test]
    fn test_output_accessors() {
        let json = ChatOutput::Json(serde_json::json!({"a": 1}));
        assert!(json.as_json().is_some());
        assert!(json.as_text().is_none());
    }
}
