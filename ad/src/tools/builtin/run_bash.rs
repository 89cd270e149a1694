//! run_bash tool - execute shell commands

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Output truncation limit
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Execute a shell command in the workspace
pub struct RunBashTool;

#[async_trait]
impl Tool for RunBashTool {
    fn name(&self) -> &'static str {
        "run_bash"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the workspace. Use for git, build tools, tests."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 30000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "RunBashTool::execute: called");
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => {
                debug!("RunBashTool::execute: missing command parameter");
                return ToolResult::error("invalid_args", "command is required");
            }
        };

        let timeout_ms = input["timeout_ms"]
            .as_u64()
            .unwrap_or(ctx.step_timeout.as_millis() as u64);
        debug!(%command, timeout_ms, "RunBashTool::execute: spawning command");

        let output = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&ctx.workspace)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(error = %e, "RunBashTool::execute: failed to spawn");
                return ToolResult::error("spawn_failed", format!("Failed to execute command: {}", e));
            }
            Err(_) => {
                debug!("RunBashTool::execute: command timed out");
                return ToolResult::error("ETIMEDOUT", format!("Command timed out after {}ms", timeout_ms));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code, stdout_len = stdout.len(), stderr_len = stderr.len(), "RunBashTool::execute: command finished");

        let combined = if stdout.is_empty() && !stderr.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };

        let truncated = if combined.len() > MAX_OUTPUT_CHARS {
            format!(
                "{}...\n[truncated, {} chars total]",
                &combined[..MAX_OUTPUT_CHARS],
                combined.len()
            )
        } else {
            combined
        };

        if output.status.success() {
            ToolResult::success(truncated)
        } else {
            ToolResult::error("command_failed", truncated).with_exit_code(exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_successful_command() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = RunBashTool
            .execute(serde_json::json!({"command": "printf hello"}), &ctx)
            .await;
        assert!(result.ok);
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn test_missing_command_not_found_is_exit_127() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = RunBashTool
            .execute(
                serde_json::json!({"command": "definitely-not-a-real-command-xyz"}),
                &ctx,
            )
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().exit_code, Some(127));
    }

    #[tokio::test]
    async fn test_timeout() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = RunBashTool
            .execute(serde_json::json!({"command": "sleep 5", "timeout_ms": 50}), &ctx)
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().name, "ETIMEDOUT");
    }

    #[tokio::test]
    async fn test_missing_command_arg() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = RunBashTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().name, "invalid_args");
    }
}
