//! Error taxonomy and diagnostic domain types

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Closed taxonomy every failure maps into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    CommandNotFound,
    PermissionDenied,
    FileNotFound,
    Timeout,
    ToolNotFound,
    Network,
    Auth,
    ResourceBusy,
    OutOfMemory,
    RateLimit,
    InvalidArgs,
    DependencyMissing,
    Syntax,
    Unknown,
}

impl ErrorCategory {
    /// Taxonomy name as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::CommandNotFound => "command_not_found",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::FileNotFound => "file_not_found",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ToolNotFound => "tool_not_found",
            ErrorCategory::Network => "network",
            ErrorCategory::Auth => "auth",
            ErrorCategory::ResourceBusy => "resource_busy",
            ErrorCategory::OutOfMemory => "out_of_memory",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::InvalidArgs => "invalid_args",
            ErrorCategory::DependencyMissing => "dependency_missing",
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw error as the executor surfaced it, before classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawError {
    /// Process exit code, when a command ran
    pub exit_code: Option<i32>,

    /// Error name (ENOENT, EACCES, tool_not_found, ...)
    pub name: String,

    /// Full error message
    pub message: String,

    /// Tool that produced the error
    pub tool: Option<String>,
}

impl RawError {
    /// Create a raw error from a name and message
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            name: name.into(),
            message: message.into(),
            tool: None,
        }
    }

    /// Builder: set exit code
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Builder: set originating tool
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }
}

/// Root cause extracted from a why-chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCause {
    /// Taxonomy category of the root cause
    pub category: ErrorCategory,

    /// One-sentence description
    pub description: String,
}

/// A layered diagnosis of one failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Classified category of the proximate error
    pub category: ErrorCategory,

    /// Up to five layered "why" sentences, proximate first
    pub why_chain: Vec<String>,

    /// Machine-friendly root cause
    pub root_cause: RootCause,

    /// Suggested direction for recovery
    pub suggested_direction: String,
}

impl Diagnosis {
    /// Maximum why-chain depth
    pub const MAX_WHY_DEPTH: usize = 5;
}

/// One executable recovery strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    /// Strategy name (e.g. "install-dependency")
    pub name: String,

    /// Executable steps (tool name + args + description)
    pub steps: Vec<crate::domain::plan::PlanStep>,

    /// Current confidence [0,1], after any learned boost
    pub confidence: f32,

    /// Confidence before pattern boosting
    pub base_confidence: f32,

    /// Boost multiplier applied, when the learner had history
    pub boost: Option<f32>,
}

impl RecoveryStrategy {
    /// Create a strategy with equal base and current confidence
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        let name = name.into();
        debug!(%name, confidence, "RecoveryStrategy::new: called");
        Self {
            name,
            steps: Vec::new(),
            confidence,
            base_confidence: confidence,
            boost: None,
        }
    }

    /// Builder: append a step
    pub fn with_step(mut self, step: crate::domain::plan::PlanStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// A ranked recovery proposal for one diagnosis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPlan {
    /// Category the plan recovers from
    pub category: ErrorCategory,

    /// Best strategy
    pub primary: RecoveryStrategy,

    /// One or two fallbacks, ranked
    pub fallbacks: Vec<RecoveryStrategy>,

    /// Historical success rate for the category, when known
    pub historical_success_rate: Option<f32>,
}
