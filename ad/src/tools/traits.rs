//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::Artifact;

use super::context::ToolContext;

/// A tool the planner can schedule and the executor can run
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches plan step tool references)
    fn name(&self) -> &'static str;

    /// Human-readable description, listed into planning prompts
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Structured error info attached to a failed tool result
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolErrorInfo {
    /// Process exit code, when a command ran
    pub exit_code: Option<i32>,

    /// Error name (ENOENT, EACCES, tool_not_found, ...)
    pub name: String,

    /// Full error message
    pub message: String,
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Whether the invocation succeeded
    pub ok: bool,

    /// Tool output (possibly truncated)
    pub output: String,

    /// Artifacts the invocation created
    pub artifacts: Vec<Artifact>,

    /// Error info, set when `ok` is false
    pub error: Option<ToolErrorInfo>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        debug!("ToolResult::success: called");
        Self {
            ok: true,
            output: output.into(),
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// Create an error result
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        debug!("ToolResult::error: called");
        let message = message.into();
        Self {
            ok: false,
            output: message.clone(),
            artifacts: Vec::new(),
            error: Some(ToolErrorInfo {
                exit_code: None,
                name: name.into(),
                message,
            }),
        }
    }

    /// Builder: attach an exit code to the error info
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        if let Some(error) = &mut self.error {
            error.exit_code = Some(exit_code);
        }
        self
    }

    /// Builder: attach an artifact
    pub fn with_artifact(mut self, path: impl Into<String>, kind: impl Into<String>) -> Self {
        self.artifacts.push(Artifact {
            path: path.into(),
            kind: kind.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("File written successfully");
        assert!(result.ok);
        assert_eq!(result.output, "File written successfully");
        assert!(result.error.is_none());
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("ENOENT", "File not found").with_exit_code(1);
        assert!(!result.ok);
        let error = result.error.unwrap();
        assert_eq!(error.name, "ENOENT");
        assert_eq!(error.exit_code, Some(1));
    }

    #[test]
    fn test_with_artifact() {
        let result = ToolResult::success("done").with_artifact("out/report.md", "file");
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].kind, "file");
    }
}
