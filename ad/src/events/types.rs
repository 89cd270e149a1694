//! Context log event types
//!
//! The single vocabulary of observable core activity. Every record names
//! its actor (autonomous / user / system) and an act; consumers tail the
//! log rather than subscribing to per-component callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who caused the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Autonomous,
    User,
    System,
}

/// Core event enum - the vocabulary of session activity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "act", rename_all = "snake_case")]
pub enum ContextEvent {
    // === Iteration lifecycle ===
    /// An iteration has started
    IterationBegin { session_id: String, iteration: u32 },
    /// A reflection landed
    Reflection {
        session_id: String,
        iteration: u32,
        assessment: String,
        predicted_progress: f32,
        confidence: f32,
        next_action: String,
        degraded: bool,
    },
    /// A planning pass completed
    PlanningPhase {
        session_id: String,
        iteration: u32,
        source: String,
        step_count: usize,
        fallback_used: bool,
        alternatives_considered: usize,
    },

    // === Checkpoints ===
    /// A low-confidence decision was suspended
    CheckpointCreated {
        session_id: String,
        checkpoint_id: String,
        decision_type: String,
        predicted_confidence: f32,
        option_count: usize,
    },
    /// A checkpoint was resolved by a human
    CheckpointResolved {
        session_id: String,
        checkpoint_id: String,
        selected_option_id: String,
        modified: bool,
    },
    /// A checkpoint expired without resolution
    CheckpointExpired { session_id: String, checkpoint_id: String },

    // === Execution ===
    /// A plan step is about to run
    ExecutionStep {
        session_id: String,
        iteration: u32,
        step_index: usize,
        tool: String,
        description: String,
    },
    /// A plan step finished
    ExecutionResult {
        session_id: String,
        iteration: u32,
        step_index: usize,
        tool: String,
        ok: bool,
        output_summary: String,
        duration_ms: u64,
    },
    /// The plan-level verification ran
    VerificationCheck {
        session_id: String,
        iteration: u32,
        check_command: String,
        passed: bool,
    },

    // === Meta-cognition ===
    /// The previous reflection was scored against the observed outcome
    MetaReflection {
        session_id: String,
        iteration: u32,
        progress_error: f32,
        confidence_error: f32,
        assessment_correct: bool,
        overall_accuracy: f32,
    },
    /// A planning pass was scored after execution
    PlanningFeedback {
        session_id: String,
        iteration: u32,
        plan_succeeded: bool,
        tools_matched: f32,
        confidence_calibration: f32,
    },
    /// A calibration observation was recorded
    ConfidenceCalibrationRecord {
        session_id: String,
        decision_type: String,
        predicted_confidence: f32,
        user_accepted: bool,
    },

    // === Diagnostics & recovery ===
    /// A raw error was classified
    ErrorClassified {
        session_id: String,
        iteration: u32,
        category: String,
        tool: Option<String>,
        message: String,
    },
    /// A why-chain diagnosis was produced
    DiagnosticReflection {
        session_id: String,
        iteration: u32,
        category: String,
        root_cause: String,
        why_depth: usize,
    },
    /// A recovery plan was proposed
    RecoveryPlan {
        session_id: String,
        iteration: u32,
        category: String,
        primary_strategy: String,
        confidence: f32,
        scheduled: bool,
    },
    /// A recovery execution finished
    RecoveryAttemptResult {
        session_id: String,
        iteration: u32,
        category: String,
        strategy: String,
        success: bool,
    },

    // === Memory ===
    /// A terminal session wrote its episode
    EpisodeWritten {
        session_id: String,
        episode_id: String,
        success: bool,
        iterations: u32,
    },
    /// The user preference profile was re-analyzed
    PreferenceAnalysis {
        session_id: String,
        risk_tolerance: String,
        decision_speed: String,
        total_decisions: usize,
    },

    // === Task generation ===
    /// A generated task card was auto-approved (audit trail)
    TaskAutoApproved {
        session_id: String,
        card_id: String,
        analyzer: String,
        confidence: f32,
    },
    /// A batch approve/dismiss ran
    TaskBatchAction {
        session_id: String,
        action: String,
        requested: usize,
        applied: usize,
    },

    // === Terminal ===
    /// The session reached a terminal (or paused) outcome
    SessionTerminal {
        session_id: String,
        outcome: String,
        reason: Option<String>,
        iterations: u32,
    },
}

impl ContextEvent {
    /// Get the session id for this event
    pub fn session_id(&self) -> &str {
        match self {
            ContextEvent::IterationBegin { session_id, .. }
            | ContextEvent::Reflection { session_id, .. }
            | ContextEvent::PlanningPhase { session_id, .. }
            | ContextEvent::CheckpointCreated { session_id, .. }
            | ContextEvent::CheckpointResolved { session_id, .. }
            | ContextEvent::CheckpointExpired { session_id, .. }
            | ContextEvent::ExecutionStep { session_id, .. }
            | ContextEvent::ExecutionResult { session_id, .. }
            | ContextEvent::VerificationCheck { session_id, .. }
            | ContextEvent::MetaReflection { session_id, .. }
            | ContextEvent::PlanningFeedback { session_id, .. }
            | ContextEvent::ConfidenceCalibrationRecord { session_id, .. }
            | ContextEvent::ErrorClassified { session_id, .. }
            | ContextEvent::DiagnosticReflection { session_id, .. }
            | ContextEvent::RecoveryPlan { session_id, .. }
            | ContextEvent::RecoveryAttemptResult { session_id, .. }
            | ContextEvent::EpisodeWritten { session_id, .. }
            | ContextEvent::PreferenceAnalysis { session_id, .. }
            | ContextEvent::TaskAutoApproved { session_id, .. }
            | ContextEvent::TaskBatchAction { session_id, .. }
            | ContextEvent::SessionTerminal { session_id, .. } => session_id,
        }
    }

    /// Get the act name as persisted
    pub fn act(&self) -> &'static str {
        match self {
            ContextEvent::IterationBegin { .. } => "iteration_begin",
            ContextEvent::Reflection { .. } => "reflection",
            ContextEvent::PlanningPhase { .. } => "planning_phase",
            ContextEvent::CheckpointCreated { .. } => "checkpoint_created",
            ContextEvent::CheckpointResolved { .. } => "checkpoint_resolved",
            ContextEvent::CheckpointExpired { .. } => "checkpoint_expired",
            ContextEvent::ExecutionStep { .. } => "execution_step",
            ContextEvent::ExecutionResult { .. } => "execution_result",
            ContextEvent::VerificationCheck { .. } => "verification_check",
            ContextEvent::MetaReflection { .. } => "meta_reflection",
            ContextEvent::PlanningFeedback { .. } => "planning_feedback",
            ContextEvent::ConfidenceCalibrationRecord { .. } => "confidence_calibration_record",
            ContextEvent::ErrorClassified { .. } => "error_classified",
            ContextEvent::DiagnosticReflection { .. } => "diagnostic_reflection",
            ContextEvent::RecoveryPlan { .. } => "recovery_plan",
            ContextEvent::RecoveryAttemptResult { .. } => "recovery_attempt_result",
            ContextEvent::EpisodeWritten { .. } => "episode_written",
            ContextEvent::PreferenceAnalysis { .. } => "preference_analysis",
            ContextEvent::TaskAutoApproved { .. } => "task_auto_approved",
            ContextEvent::TaskBatchAction { .. } => "task_batch_action",
            ContextEvent::SessionTerminal { .. } => "session_terminal",
        }
    }
}

/// A timestamped, attributed event record for file persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// Who caused the event
    pub actor: Actor,

    /// The event
    #[serde(flatten)]
    pub event: ContextEvent,
}

impl ContextRecord {
    /// Create a record with current timestamp
    pub fn new(actor: Actor, event: ContextEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            actor,
            event,
        }
    }
}
