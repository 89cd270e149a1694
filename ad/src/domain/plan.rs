//! Instruction plan domain types
//!
//! A plan is what the executor actually steps through: ordered tool
//! invocations with expected outcomes and per-step error-handling hints,
//! plus an optional verification command that decides plan-level success.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bounds on plan length
pub const MIN_PLAN_STEPS: usize = 3;
pub const MAX_PLAN_STEPS: usize = 7;

/// One executable step of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Tool name from the registry
    pub tool: String,

    /// Tool arguments
    pub args: serde_json::Value,

    /// What this step is for
    pub description: String,

    /// What the step should produce
    pub expected_outcome: String,

    /// In-plan fallback hint: "retry" | "skip" | "fallback:<tool>" | "abort"
    pub error_handling: String,

    /// Step confidence [0,1]
    pub confidence: f32,
}

impl PlanStep {
    /// Create a step with default handling (abort on failure)
    pub fn new(tool: impl Into<String>, args: serde_json::Value, description: impl Into<String>) -> Self {
        let tool = tool.into();
        debug!(%tool, "PlanStep::new: called");
        Self {
            tool,
            args,
            description: description.into(),
            expected_outcome: String::new(),
            error_handling: "abort".to_string(),
            confidence: 0.7,
        }
    }

    /// Builder: set expected outcome
    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    /// Builder: set error handling hint
    pub fn with_error_handling(mut self, handling: impl Into<String>) -> Self {
        self.error_handling = handling.into();
        self
    }

    /// Builder: set confidence
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Whether the step mutates state outside the session (rm, push, deploy...)
    pub fn is_destructive(&self) -> bool {
        let text = format!("{} {}", self.description, self.args).to_lowercase();
        const DESTRUCTIVE: [&str; 8] = [
            "rm -", "rmdir", "delete", "remove", "drop ", "force push", "push --force", "truncate",
        ];
        DESTRUCTIVE.iter().any(|marker| text.contains(marker))
    }
}

/// Verification that decides plan-level success
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    /// Shell command whose exit code verifies the plan
    pub check_command: String,

    /// Human-readable success criteria
    pub success_criteria: String,
}

/// A complete, executable plan for one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionPlan {
    /// One-line approach summary
    pub approach: String,

    /// Preconditions the plan assumes
    pub prerequisites: Vec<String>,

    /// Ordered steps
    pub steps: Vec<PlanStep>,

    /// Optional verification
    pub verification: Option<Verification>,

    /// Textual alternative approaches
    pub alternatives: Vec<String>,

    /// How the plan was produced: "llm" | "heuristic_fallback" | "cached" | "recovery" | "alternative"
    pub source: String,
}

impl InstructionPlan {
    /// Create an empty plan with an approach line
    pub fn new(approach: impl Into<String>) -> Self {
        let approach = approach.into();
        debug!(%approach, "InstructionPlan::new: called");
        Self {
            approach,
            prerequisites: Vec::new(),
            steps: Vec::new(),
            verification: None,
            alternatives: Vec::new(),
            source: "llm".to_string(),
        }
    }

    /// Builder: append a step
    pub fn with_step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Builder: set verification
    pub fn with_verification(mut self, check_command: impl Into<String>, criteria: impl Into<String>) -> Self {
        self.verification = Some(Verification {
            check_command: check_command.into(),
            success_criteria: criteria.into(),
        });
        self
    }

    /// Builder: set source tag
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Mean step confidence; 0.5 for an empty plan
    pub fn mean_confidence(&self) -> f32 {
        if self.steps.is_empty() {
            return 0.5;
        }
        self.steps.iter().map(|s| s.confidence).sum::<f32>() / self.steps.len() as f32
    }

    /// Distinct tools the plan references, in order
    pub fn tools(&self) -> Vec<String> {
        let mut tools = Vec::new();
        for step in &self.steps {
            if !tools.contains(&step.tool) {
                tools.push(step.tool.clone());
            }
        }
        tools
    }

    /// Whether any step is destructive
    pub fn has_destructive_step(&self) -> bool {
        self.steps.iter().any(|s| s.is_destructive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_builder() {
        let plan = InstructionPlan::new("clone then read")
            .with_step(PlanStep::new("run_bash", serde_json::json!({"command": "git clone x"}), "clone repo"))
            .with_step(PlanStep::new("read_file", serde_json::json!({"path": "x/README.md"}), "read readme"))
            .with_verification("test -d x", "clone directory exists");

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.tools(), vec!["run_bash".to_string(), "read_file".to_string()]);
        assert!(plan.verification.is_some());
    }

    #[test]
    fn test_destructive_detection() {
        let benign = PlanStep::new("run_bash", serde_json::json!({"command": "ls -la"}), "list files");
        assert!(!benign.is_destructive());

        let nasty = PlanStep::new("run_bash", serde_json::json!({"command": "rm -rf build"}), "clean build dir");
        assert!(nasty.is_destructive());
    }

    #[test]
    fn test_mean_confidence() {
        let plan = InstructionPlan::new("x")
            .with_step(PlanStep::new("echo", serde_json::json!({}), "a").with_confidence(0.4))
            .with_step(PlanStep::new("echo", serde_json::json!({}), "b").with_confidence(0.8));
        assert!((plan.mean_confidence() - 0.6).abs() < 1e-6);
        assert_eq!(InstructionPlan::new("empty").mean_confidence(), 0.5);
    }
}
