//! read_dir tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// List a directory inside the workspace
pub struct ReadDirTool;

#[async_trait]
impl Tool for ReadDirTool {
    fn name(&self) -> &'static str {
        "read_dir"
    }

    fn description(&self) -> &'static str {
        "List directory entries. Path is relative to the workspace; defaults to the root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace (default: .)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "ReadDirTool::execute: called");
        let path = input["path"].as_str().unwrap_or(".");

        let validated = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "ReadDirTool::execute: sandbox violation");
                return ToolResult::error("EACCES", e.to_string());
            }
        };

        let mut entries = match tokio::fs::read_dir(&validated).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::error("ENOENT", format!("No such directory: {}", path));
            }
            Err(e) => return ToolResult::error("io_error", e.to_string()),
        };

        let mut lines = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let kind = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => "dir",
                Ok(_) => "file",
                Err(_) => "?",
            };
            lines.push(format!("{} {}", kind, name));
        }
        lines.sort();

        debug!(entry_count = lines.len(), "ReadDirTool::execute: listed directory");
        ToolResult::success(lines.join("\n"))
    }
}
