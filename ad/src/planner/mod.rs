//! Planning layer
//!
//! [`task`] converts a single action into an executable plan; the
//! [`alternatives`] pipeline widens the search to 3-5 candidates when
//! confidence is low. Both constrain steps to the tool registry and fall
//! back to heuristics when the LLM misbehaves.

pub mod alternatives;
mod cache;
mod task;

pub use alternatives::{
    AlternativePlanner, EffortContext, GenerateContext, GenerationMethod, decision_to_plan,
};
pub use cache::{DEFAULT_CACHE_TTL, PlanCache, PlanCacheKey, hash_tool_set, normalize_action};
pub use task::{DEFAULT_PLANNING_TIMEOUT, PlanContext, PlanningOutcome, TaskPlanner, heuristic_plan};
