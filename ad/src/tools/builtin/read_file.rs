//! read_file tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Content truncation limit
const MAX_CONTENT_CHARS: usize = 50_000;

/// Read a file inside the workspace
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file's contents. Path is relative to the workspace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "ReadFileTool::execute: called");
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("invalid_args", "path is required"),
        };

        let validated = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "ReadFileTool::execute: sandbox violation");
                return ToolResult::error("EACCES", e.to_string());
            }
        };

        match tokio::fs::read_to_string(&validated).await {
            Ok(content) => {
                let truncated = if content.len() > MAX_CONTENT_CHARS {
                    format!("{}...\n[truncated, {} chars total]", &content[..MAX_CONTENT_CHARS], content.len())
                } else {
                    content
                };
                ToolResult::success(truncated)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("ReadFileTool::execute: file not found");
                ToolResult::error("ENOENT", format!("No such file: {}", path))
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
    async fn test_read_existing_file() {
        let temp = tempdir().unwrap();
        tokio::fs::write(temp.path().join("hello.txt"), "contents").await.unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let result = ReadFileTool.execute(serde_json::json!({"path": "hello.txt"}), &ctx).await;
        assert!(result.ok);
        assert_eq!(result.output, "contents");
    }

    #[tokio::test]
    async fn test_missing_file_is_enoent() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = ReadFileTool.execute(serde_json::json!({"path": "nope.txt"}), &ctx).await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().name, "ENOENT");
    }

    #[tokio::test]
    async fn test_traversal_is_eacces() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "../../etc/passwd"}), &ctx)
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().name, "EACCES");
    }
}
