//! write_file tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Write a file inside the workspace, creating parent directories
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file, creating parent directories. Path is relative to the workspace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(path = ?input["path"], "WriteFileTool::execute: called");
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_args", "path is required"),
        };
        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("invalid_args", "content is required"),
        };

        let validated = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "WriteFileTool::execute: sandbox violation");
                return ToolResult::error("EACCES", e.to_string());
            }
        };

        if let Some(parent) = validated.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error("io_error", e.to_string());
            }
        }

        match tokio::fs::write(&validated, content).await {
            Ok(()) => {
                debug!(bytes = content.len(), "WriteFileTool::execute: wrote file");
                ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path)).with_artifact(path, "file")
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ToolResult::error("EACCES", format!("Permission denied: {}", path))
            }
            Err(e) => ToolResult::error("io_error", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_file_and_artifact() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = WriteFileTool
            .execute(serde_json::json!({"path": "out/note.md", "content": "hi"}), &ctx)
            .await;
        assert!(result.ok);
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].path, "out/note.md");

        let written = tokio::fs::read_to_string(temp.path().join("out/note.md")).await.unwrap();
        assert_eq!(written, "hi");
    }

    #[tokio::test]
    async fn test_write_outside_workspace_is_eacces() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = WriteFileTool
            .execute(serde_json::json!({"path": "/tmp/evil.txt", "content": "x"}), &ctx)
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().name, "EACCES");
    }
}
