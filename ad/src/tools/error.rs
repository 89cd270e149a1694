//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by tool infrastructure (not tool execution itself)
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path escapes workspace: {path}")]
    PathOutsideWorkspace { path: PathBuf },

    #[error("Tool not in registry: {name}")]
    UnknownTool { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ToolError::UnknownTool {
            name: "mystery".to_string(),
        };
        assert!(err.to_string().contains("mystery"));
    }
}
