//! ToolExecutor - registry plus execution entry point
//!
//! Tools are enumerable so the planner can list names and descriptions
//! into prompts. An invocation naming a tool outside the registry fails
//! with the `tool_not_found` error name, which the classifier maps
//! directly onto its taxonomy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::ToolSchema;

use super::builtin::{EchoTool, HttpFetchTool, ReadDirTool, ReadFileTool, RunBashTool, WriteFileTool};
use super::{Tool, ToolContext, ToolResult};

/// One tool invocation as the scheduler issues it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Registry tool name
    pub tool_name: String,

    /// Tool arguments
    pub args: serde_json::Value,
}

impl ToolInvocation {
    /// Create an invocation
    pub fn new(tool_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
        }
    }
}

/// Manages tool registration and execution for a session
pub struct ToolExecutor {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create executor with the standard tool set
    pub fn standard() -> Self {
        debug!("ToolExecutor::standard: called");
        let mut executor = Self::empty();
        executor.add_tool(Box::new(RunBashTool));
        executor.add_tool(Box::new(ReadFileTool));
        executor.add_tool(Box::new(WriteFileTool));
        executor.add_tool(Box::new(ReadDirTool));
        executor.add_tool(Box::new(HttpFetchTool::new()));
        executor.add_tool(Box::new(EchoTool));
        executor
    }

    /// Create an empty executor (for testing or custom registries)
    pub fn empty() -> Self {
        debug!("ToolExecutor::empty: called");
        Self { tools: BTreeMap::new() }
    }

    /// Add a tool to the registry
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Tool schemas for planning prompts and LLM function calling
    pub fn definitions(&self) -> Vec<ToolSchema> {
        debug!(count = self.tools.len(), "ToolExecutor::definitions: called");
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// One line per tool for prompt rendering: "name: description"
    pub fn describe_for_prompt(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Execute one invocation
    ///
    /// An unknown tool name yields an error result named
    /// `tool_not_found`, never a panic or an untyped error.
    pub async fn execute(&self, invocation: &ToolInvocation, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %invocation.tool_name, session_id = %ctx.session_id, "ToolExecutor::execute: called");
        match self.tools.get(&invocation.tool_name) {
            Some(tool) => {
                debug!("ToolExecutor::execute: tool found, executing");
                tool.execute(invocation.args.clone(), ctx).await
            }
            None => {
                debug!(tool_name = %invocation.tool_name, "ToolExecutor::execute: unknown tool");
                ToolResult::error(
                    "tool_not_found",
                    format!("Tool not in registry: {}", invocation.tool_name),
                )
            }
        }
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_standard_executor_has_expected_tools() {
        let executor = ToolExecutor::standard();
        for name in ["run_bash", "read_file", "write_file", "read_dir", "http_fetch", "echo"] {
            assert!(executor.has_tool(name), "missing tool {}", name);
        }
    }

    #[test]
    fn test_definitions_enumerate_registry() {
        let executor = ToolExecutor::standard();
        let defs = executor.definitions();
        assert_eq!(defs.len(), executor.tool_names().len());
        assert!(defs.iter().any(|d| d.name == "run_bash"));
    }

    #[test]
    fn test_describe_for_prompt() {
        let executor = ToolExecutor::standard();
        let described = executor.describe_for_prompt();
        assert!(described.contains("run_bash:"));
        assert!(described.contains("echo:"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_tool_not_found() {
        let executor = ToolExecutor::standard();
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let invocation = ToolInvocation::new("mystery_tool", serde_json::json!({}));
        let result = executor.execute(&invocation, &ctx).await;

        assert!(!result.ok);
        assert_eq!(result.error.unwrap().name, "tool_not_found");
    }
}
