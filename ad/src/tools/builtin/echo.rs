//! echo tool - the no-op diagnostic
//!
//! Planners substitute `echo` for out-of-registry tool references and
//! use it as the minimal diagnostic step, so it must always exist.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Echo the given message back
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo a message back. Useful as a no-op diagnostic step."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Message to echo"
                }
            }
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        debug!(?input, "EchoTool::execute: called");
        let message = input["message"].as_str().unwrap_or("");
        ToolResult::success(message)
    }
}
