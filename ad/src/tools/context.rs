//! ToolContext - execution context for tools
//!
//! Each session gets one `ToolContext` scoping all file operations to
//! its workspace root. Escaping the root is a policy violation and
//! surfaces as a permission error, never as a successful operation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::error::ToolError;

/// Default per-step timeout
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution context for tools - scoped to a single session
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root - all file ops constrained here
    pub workspace: PathBuf,

    /// Owning session id
    pub session_id: String,

    /// Whether sandbox enforcement is enabled (default: true)
    pub sandbox_enabled: bool,

    /// Per-step timeout
    pub step_timeout: Duration,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(workspace: PathBuf, session_id: String) -> Self {
        debug!(?workspace, %session_id, "ToolContext::new: called");
        Self {
            workspace,
            session_id,
            sandbox_enabled: true,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Create a context with sandbox disabled (for testing)
    pub fn new_unsandboxed(workspace: PathBuf, session_id: String) -> Self {
        debug!(?workspace, %session_id, "ToolContext::new_unsandboxed: called");
        Self {
            workspace,
            session_id,
            sandbox_enabled: false,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Builder: set the per-step timeout
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Normalize a path relative to the workspace
    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate a path is inside the workspace (sandbox enforcement)
    ///
    /// Resolves `..` components lexically so traversal cannot slip past
    /// the check via non-existent intermediate directories.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        debug!(?path, "ToolContext::validate_path: called");
        let normalized = self.normalize_path(path);

        if !self.sandbox_enabled {
            debug!("ToolContext::validate_path: sandbox disabled");
            return Ok(normalized);
        }

        let resolved = lexical_resolve(&normalized);
        let root = lexical_resolve(&self.workspace);
        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            debug!(?resolved, ?root, "ToolContext::validate_path: path escapes workspace");
            Err(ToolError::PathOutsideWorkspace { path: resolved })
        }
    }
}

/// Resolve `.` and `..` components without touching the filesystem
fn lexical_resolve(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    resolved
}
