//! Tool system
//!
//! Tools provide file system access, command execution, and fetches to
//! the session. Each session gets a `ToolContext` scoped to its
//! workspace root - tools cannot escape the workspace sandbox, and every
//! failure surfaces as a structured error the classifier can map.

mod context;
mod error;
mod executor;
mod traits;

pub mod builtin;

pub use context::{DEFAULT_STEP_TIMEOUT, ToolContext};
pub use error::ToolError;
pub use executor::{ToolExecutor, ToolInvocation};
pub use traits::{Tool, ToolErrorInfo, ToolResult};
