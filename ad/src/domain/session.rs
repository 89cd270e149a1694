//! Session domain type
//!
//! One session is one task driven to a terminal outcome. The scheduler
//! owns the session exclusively and mutates it only inside an iteration
//! boundary; everything here is plain state plus bounded-ring helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::diagnosis::ErrorCategory;
use super::reflection::Reflection;

/// Default iteration ceiling
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Bound on recent reflections and planning feedback retained in-session
pub const RECENT_RING_LEN: usize = 5;

/// Classified task type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodeGeneration,
    Analysis,
    Debugging,
    Refactoring,
    Testing,
    Documentation,
    Other,
}

impl TaskType {
    /// Classify a task from its text by keyword matching
    pub fn classify(task: &str) -> Self {
        debug!(task_len = task.len(), "TaskType::classify: called");
        let lower = task.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["debug", "fix", "bug", "broken", "failing", "error"]) {
            TaskType::Debugging
        } else if has(&["refactor", "restructure", "clean up", "cleanup", "simplify"]) {
            TaskType::Refactoring
        } else if has(&["test", "coverage", "assert"]) {
            TaskType::Testing
        } else if has(&["document", "readme", "docs", "comment"]) {
            TaskType::Documentation
        } else if has(&["analyze", "analyse", "investigate", "profile", "measure", "explain"]) {
            TaskType::Analysis
        } else if has(&["write", "create", "implement", "build", "add", "generate", "clone", "install"]) {
            TaskType::CodeGeneration
        } else {
            TaskType::Other
        }
    }

    /// Taxonomy name as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CodeGeneration => "code_generation",
            TaskType::Analysis => "analysis",
            TaskType::Debugging => "debugging",
            TaskType::Refactoring => "refactoring",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
            TaskType::Other => "other",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal (or in-flight) outcome of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SessionOutcome {
    Running,
    Completed,
    Stopped { reason: String },
    Stuck,
    NeedsClarification,
}

impl SessionOutcome {
    /// Whether the session has finished (clarification pauses, it does not finish)
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionOutcome::Completed | SessionOutcome::Stopped { .. } | SessionOutcome::Stuck)
    }
}

/// An artifact produced by a tool step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Workspace-relative path
    pub path: String,
    /// Kind hint (file, directory, url, ...)
    pub kind: String,
}

/// Classified error attached to a failed iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Classifier taxonomy category
    pub category: ErrorCategory,
    /// Tool that failed, if any
    pub tool: Option<String>,
    /// Raw error message
    pub message: String,
}

/// One iteration as remembered by the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionHistoryEntry {
    /// Iteration this entry belongs to (matches its reflection one-to-one)
    pub iteration: u32,

    /// The next-action the reflection proposed
    pub next_action: String,

    /// Tools invoked during the iteration
    pub tools_used: Vec<String>,

    /// Result summary; set when the iteration produced output
    pub result_summary: Option<String>,

    /// Artifacts created this iteration
    pub artifacts: Vec<Artifact>,

    /// Classified error; set when the iteration failed
    pub error: Option<FailureInfo>,

    /// Progress the reflection predicted [0,100]
    pub predicted_progress: f32,

    /// Confidence the reflection predicted [0,1]
    pub predicted_confidence: f32,

    /// Whether the iteration's plan succeeded
    pub succeeded: bool,

    /// LLM input tokens consumed this iteration
    pub input_tokens: u64,

    /// LLM output tokens consumed this iteration
    pub output_tokens: u64,
}

/// Feedback on one planning pass, kept in a bounded ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningFeedback {
    pub iteration: u32,
    pub plan_succeeded: bool,
    /// Fraction of planned tools that were actually used
    pub tools_matched: f32,
    /// Calibration score per the high/low x success/fail mapping
    pub confidence_calibration: f32,
}

/// The unit of execution: one task, one owner, one terminal outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Time-ordered unique id
    pub id: String,

    /// Original task text
    pub task: String,

    /// Classified task type
    pub task_type: TaskType,

    /// Iteration ceiling
    pub max_iterations: u32,

    /// Current iteration (monotonically increasing, 0 before the first)
    pub iteration: u32,

    /// Agent-estimated progress [0,100]
    pub progress: f32,

    /// Latest confidence [0,1]
    pub confidence: f32,

    /// Per-iteration history
    pub history: Vec<ActionHistoryEntry>,

    /// Artifacts accumulated across iterations
    pub artifacts: Vec<Artifact>,

    /// Classified failures accumulated across iterations
    pub failures: Vec<FailureInfo>,

    /// Last few reflections (bounded ring)
    pub recent_reflections: Vec<Reflection>,

    /// Last few planning scores (bounded ring)
    pub planning_feedback: Vec<PlanningFeedback>,

    /// Current outcome
    pub outcome: SessionOutcome,

    /// Clarification questions exposed while paused
    pub clarification_questions: Vec<String>,

    /// Stuck threshold in force, recorded at session start
    pub stuck_threshold: usize,

    /// When the session started
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session for a task
    pub fn new(task: impl Into<String>, max_iterations: u32, stuck_threshold: usize) -> Self {
        let task = task.into();
        let task_type = TaskType::classify(&task);
        let id = Uuid::now_v7().to_string();
        debug!(%id, %task_type, max_iterations, "Session::new: called");
        Self {
            id,
            task,
            task_type,
            max_iterations,
            iteration: 0,
            progress: 0.0,
            confidence: 0.5,
            history: Vec::new(),
            artifacts: Vec::new(),
            failures: Vec::new(),
            recent_reflections: Vec::new(),
            planning_feedback: Vec::new(),
            outcome: SessionOutcome::Running,
            clarification_questions: Vec::new(),
            stuck_threshold,
            started_at: Utc::now(),
        }
    }

    /// Push a reflection into the bounded ring
    pub fn push_reflection(&mut self, reflection: Reflection) {
        debug!(id = %self.id, iteration = reflection.iteration, "Session::push_reflection: called");
        self.recent_reflections.push(reflection);
        if self.recent_reflections.len() > RECENT_RING_LEN {
            self.recent_reflections.remove(0);
        }
    }

    /// Push planning feedback into the bounded ring
    pub fn push_planning_feedback(&mut self, feedback: PlanningFeedback) {
        debug!(id = %self.id, iteration = feedback.iteration, "Session::push_planning_feedback: called");
        self.planning_feedback.push(feedback);
        if self.planning_feedback.len() > RECENT_RING_LEN {
            self.planning_feedback.remove(0);
        }
    }

    /// Append an iteration's history entry
    pub fn push_history(&mut self, entry: ActionHistoryEntry) {
        debug!(id = %self.id, iteration = entry.iteration, succeeded = entry.succeeded, "Session::push_history: called");
        for artifact in &entry.artifacts {
            if !self.artifacts.contains(artifact) {
                self.artifacts.push(artifact.clone());
            }
        }
        if let Some(error) = &entry.error {
            self.failures.push(error.clone());
        }
        self.history.push(entry);
    }

    /// Last N history entries, oldest first
    pub fn recent_history(&self, n: usize) -> &[ActionHistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Distinct tools used across the session
    pub fn tools_used(&self) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        for entry in &self.history {
            for tool in &entry.tools_used {
                if !tools.contains(tool) {
                    tools.push(tool.clone());
                }
            }
        }
        tools
    }

    /// Last three next-actions, most recent last
    pub fn last_next_actions(&self, n: usize) -> Vec<&str> {
        let start = self.history.len().saturating_sub(n);
        self.history[start..].iter().map(|e| e.next_action.as_str()).collect()
    }

    /// Error categories encountered, in order of first occurrence
    pub fn error_categories(&self) -> Vec<ErrorCategory> {
        let mut categories = Vec::new();
        for failure in &self.failures {
            if !categories.contains(&failure.category) {
                categories.push(failure.category);
            }
        }
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reflection::{Assessment, Reflection};

    #[test]
    fn test_task_classification() {
        assert_eq!(TaskType::classify("Fix the failing login test"), TaskType::Debugging);
        assert_eq!(TaskType::classify("Refactor the sort helper"), TaskType::Refactoring);
        assert_eq!(TaskType::classify("Write unit coverage for parser"), TaskType::Testing);
        assert_eq!(TaskType::classify("Document the API surface"), TaskType::Documentation);
        assert_eq!(TaskType::classify("Clone the repository at example.com"), TaskType::CodeGeneration);
        assert_eq!(TaskType::classify("hmm"), TaskType::Other);
    }

    #[test]
    fn test_reflection_ring_is_bounded() {
        let mut session = Session::new("task", 50, 5);
        for i in 0..8 {
            session.push_reflection(Reflection {
                iteration: i,
                assessment: Assessment::Continue,
                predicted_progress: 10.0,
                confidence: 0.5,
                reasoning: String::new(),
                next_action: format!("step {}", i),
                questions: vec![],
                degraded: false,
            });
        }
        assert_eq!(session.recent_reflections.len(), RECENT_RING_LEN);
        assert_eq!(session.recent_reflections[0].iteration, 3);
    }

    #[test]
    fn test_history_accumulates_artifacts_and_failures() {
        let mut session = Session::new("task", 50, 5);
        session.push_history(ActionHistoryEntry {
            iteration: 1,
            next_action: "clone".to_string(),
            tools_used: vec!["run_bash".to_string()],
            result_summary: Some("cloned".to_string()),
            artifacts: vec![Artifact {
                path: "bar".to_string(),
                kind: "directory".to_string(),
            }],
            error: None,
            predicted_progress: 30.0,
            predicted_confidence: 0.8,
            succeeded: true,
            input_tokens: 100,
            output_tokens: 50,
        });
        assert_eq!(session.artifacts.len(), 1);
        assert!(session.failures.is_empty());
        assert_eq!(session.tools_used(), vec!["run_bash".to_string()]);
    }

    #[test]
    fn test_outcome_terminality() {
        assert!(SessionOutcome::Completed.is_terminal());
        assert!(SessionOutcome::Stuck.is_terminal());
        assert!(
            SessionOutcome::Stopped {
                reason: "max_iterations_reached".to_string()
            }
            .is_terminal()
        );
        assert!(!SessionOutcome::Running.is_terminal());
        assert!(!SessionOutcome::NeedsClarification.is_terminal());
    }

    #[test]
    fn test_session_ids_are_time_ordered() {
        let a = Session::new("first", 50, 5);
        let b = Session::new("second", 50, 5);
        assert!(a.id < b.id);
    }
}
