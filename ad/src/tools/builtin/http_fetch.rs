//! http_fetch tool

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Body truncation limit
const MAX_BODY_CHARS: usize = 20_000;

/// Fetch a URL over HTTP GET
pub struct HttpFetchTool {
    http: reqwest::Client,
}

impl HttpFetchTool {
    /// Create the tool with a shared HTTP client
    pub fn new() -> Self {
        debug!("HttpFetchTool::new: called");
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn name(&self) -> &'static str {
        "http_fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch a URL over HTTP GET and return the response body."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        debug!(?input, "HttpFetchTool::execute: called");
        let url = match input["url"].as_str() {
            Some(u) => u,
            None => return ToolResult::error("invalid_args", "url is required"),
        };

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                debug!("HttpFetchTool::execute: request timed out");
                return ToolResult::error("ETIMEDOUT", format!("Request timed out: {}", url));
            }
            Err(e) => {
                debug!(error = %e, "HttpFetchTool::execute: network error");
                return ToolResult::error("network_error", e.to_string());
            }
        };

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return ToolResult::error("unauthorized", format!("HTTP {} for {}", status, url));
        }
        if status == 429 {
            return ToolResult::error("rate_limited", format!("HTTP 429 for {}", url));
        }
        if !response.status().is_success() {
            return ToolResult::error("http_error", format!("HTTP {} for {}", status, url));
        }

        let body = response.text().await.unwrap_or_default();
        let truncated = if body.len() > MAX_BODY_CHARS {
            format!("{}...\n[truncated, {} chars total]", &body[..MAX_BODY_CHARS], body.len())
        } else {
            body
        };
        debug!(body_len = truncated.len(), "HttpFetchTool::execute: fetched");
        ToolResult::success(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_url_arg() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = HttpFetchTool::new().execute(serde_json::json!({}), &ctx).await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().name, "invalid_args");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());
        let result = HttpFetchTool::new()
            .execute(serde_json::json!({"url": "http://127.0.0.1:1/nope"}), &ctx)
            .await;
        assert!(!result.ok);
    }
}
