//! Domain types for the agent core
//!
//! Sessions, reflections, plans, alternatives, diagnoses, checkpoints,
//! and task cards. Plain serde'd state; behavior lives in the modules
//! that drive it.

mod alternative;
mod checkpoint;
mod diagnosis;
mod plan;
mod reflection;
mod session;
mod taskcard;

pub use alternative::{
    Alternative, AlternativeStep, AlignmentResult, EffortEstimate, EvalWeights, IterationEstimate, Level,
    RankedAlternative, RankedDecision, Relevance, ScoreBreakdown,
};
pub use checkpoint::{Checkpoint, CheckpointOption, CheckpointResolution, DecisionType, RiskLevel};
pub use diagnosis::{Diagnosis, ErrorCategory, RawError, RecoveryPlan, RecoveryStrategy, RootCause};
pub use plan::{InstructionPlan, MAX_PLAN_STEPS, MIN_PLAN_STEPS, PlanStep, Verification};
pub use reflection::{Assessment, Reflection};
pub use session::{
    ActionHistoryEntry, Artifact, DEFAULT_MAX_ITERATIONS, FailureInfo, PlanningFeedback, RECENT_RING_LEN, Session,
    SessionOutcome, TaskType,
};
pub use taskcard::{FunnelMetrics, TaskCard, TaskCardStatus};
