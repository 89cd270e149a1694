//! LLM client module
//!
//! The chat contract the scheduler depends on: request/response with an
//! expected response format and optional tool schemas. One HTTP
//! implementation (Anthropic messages API) plus a scripted mock for
//! tests.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod types;

pub use anthropic::{AnthropicClient, extract_json_object};
pub use client::LlmClient;
pub use error::LlmError;
pub use types::{
    ChatOutput, ChatRequest, ChatResponse, Message, ResponseFormat, Role, TokenUsage, ToolSchema,
};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: anthropic",
                other
            )))
        }
    }
}
