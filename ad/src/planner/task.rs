//! Task planner - action text to executable InstructionPlan
//!
//! The LLM path renders the planning prompt with the action, goal, tool
//! registry, recent history, and failures, expecting a JSON plan back.
//! Planning has a soft time budget; past it (or on any LLM failure) a
//! cached plan or the heuristic fallback is returned instead.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{InstructionPlan, MAX_PLAN_STEPS, MIN_PLAN_STEPS, PlanStep, TaskType};
use crate::llm::{ChatRequest, LlmClient, Message};
use crate::prompts;

use super::cache::{DEFAULT_CACHE_TTL, PlanCache, PlanCacheKey};

/// Default soft planning budget
pub const DEFAULT_PLANNING_TIMEOUT: Duration = Duration::from_millis(3000);

/// Inputs to one planning pass
#[derive(Debug, Clone)]
pub struct PlanContext {
    /// The action to plan
    pub action: String,

    /// Overall task goal
    pub goal: String,

    /// Task type for cache keying and prompts
    pub task_type: TaskType,

    /// Registered tool names
    pub tool_names: Vec<String>,

    /// "name: description" lines for the prompt
    pub tool_descriptions: String,

    /// Last few history entries, rendered
    pub recent_history: Vec<String>,

    /// Recent failure summaries
    pub recent_failures: Vec<String>,

    /// Workspace path for the prompt
    pub cwd: String,

    /// Set when the scheduler demands a fundamentally different approach
    pub force_different_approach: bool,
}

/// Outcome of a planning pass
#[derive(Debug, Clone)]
pub struct PlanningOutcome {
    pub plan: InstructionPlan,
    pub fallback_used: bool,
}

/// Converts actions into executable plans
pub struct TaskPlanner {
    llm: Option<Arc<dyn LlmClient>>,
    cache: Mutex<PlanCache>,
    timeout: Duration,
    fallback_enabled: bool,
    cache_enabled: bool,
}

impl TaskPlanner {
    /// Heuristic-only planner
    pub fn heuristic() -> Self {
        debug!("TaskPlanner::heuristic: called");
        Self {
            llm: None,
            cache: Mutex::new(PlanCache::new(DEFAULT_CACHE_TTL)),
            timeout: DEFAULT_PLANNING_TIMEOUT,
            fallback_enabled: true,
            cache_enabled: true,
        }
    }

    /// LLM-backed planner with fallback and cache
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        debug!("TaskPlanner::with_llm: called");
        Self {
            llm: Some(llm),
            cache: Mutex::new(PlanCache::new(DEFAULT_CACHE_TTL)),
            timeout: DEFAULT_PLANNING_TIMEOUT,
            fallback_enabled: true,
            cache_enabled: true,
        }
    }

    /// Builder: set the soft planning budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: set cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Mutex::new(PlanCache::new(ttl));
        self
    }

    /// Builder: toggle fallback and cache
    pub fn with_toggles(mut self, fallback_enabled: bool, cache_enabled: bool) -> Self {
        self.fallback_enabled = fallback_enabled;
        self.cache_enabled = cache_enabled;
        self
    }

    /// Plan one action
    pub async fn plan(&self, ctx: &PlanContext) -> PlanningOutcome {
        debug!(action = %ctx.action, "TaskPlanner::plan: called");
        let key = PlanCacheKey::new(ctx.task_type.as_str(), &ctx.action, &ctx.tool_names);

        if let Some(llm) = &self.llm {
            match tokio::time::timeout(self.timeout, self.plan_with_llm(llm, ctx)).await {
                Ok(Some(plan)) => {
                    debug!(steps = plan.steps.len(), "TaskPlanner::plan: LLM plan accepted");
                    return PlanningOutcome {
                        plan,
                        fallback_used: false,
                    };
                }
                Ok(None) => {
                    warn!("TaskPlanner::plan: LLM planning failed");
                }
                Err(_) => {
                    warn!(budget = ?self.timeout, "TaskPlanner::plan: planning budget exceeded");
                }
            }
        }

        // Cached plan beats the heuristic when available
        if self.cache_enabled {
            let mut cache = self.cache.lock().expect("plan cache lock poisoned");
            if let Some(plan) = cache.get(&key) {
                info!(action = %ctx.action, "TaskPlanner::plan: using cached plan");
                return PlanningOutcome {
                    plan,
                    fallback_used: true,
                };
            }
        }

        if !self.fallback_enabled && self.llm.is_some() {
            debug!("TaskPlanner::plan: fallback disabled, returning minimal plan anyway");
        }
        PlanningOutcome {
            plan: heuristic_plan(ctx),
            fallback_used: true,
        }
    }

    /// Record that a plan's execution succeeded, enabling cache storage
    pub fn record_success(&self, ctx: &PlanContext, plan: &InstructionPlan) {
        if !self.cache_enabled {
            return;
        }
        debug!(action = %ctx.action, "TaskPlanner::record_success: called");
        let key = PlanCacheKey::new(ctx.task_type.as_str(), &ctx.action, &ctx.tool_names);
        let mut cache = self.cache.lock().expect("plan cache lock poisoned");
        cache.store_success(key, plan.clone());
    }

    async fn plan_with_llm(&self, llm: &Arc<dyn LlmClient>, ctx: &PlanContext) -> Option<InstructionPlan> {
        let prompt = prompts::render(
            prompts::PLAN,
            &[
                ("action", ctx.action.as_str()),
                ("goal", ctx.goal.as_str()),
                ("tools", ctx.tool_descriptions.as_str()),
                ("history", &bulleted(&ctx.recent_history)),
                ("failures", &bulleted(&ctx.recent_failures)),
                ("cwd", ctx.cwd.as_str()),
                (
                    "directive",
                    if ctx.force_different_approach {
                        "The previous attempts repeated themselves without success. Take a fundamentally different approach."
                    } else {
                        ""
                    },
                ),
            ],
        );

        let request = ChatRequest::new("You plan tool sequences for an autonomous agent. Use only the listed tools.")
            .with_message(Message::user(prompt))
            .expecting_json()
            .with_max_tokens(2048);

        let response = llm.chat(request).await.ok()?;
        let value = response.output.as_json()?;
        parse_plan(value, &ctx.tool_names)
    }
}

/// Parse the LLM's JSON plan, repairing tool references
fn parse_plan(value: &serde_json::Value, tool_names: &[String]) -> Option<InstructionPlan> {
    let mut plan = InstructionPlan::new(value.get("approach").and_then(|v| v.as_str()).unwrap_or("planned approach"));

    plan.prerequisites = value
        .get("prerequisites")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let raw_steps = value.get("steps")?.as_array()?;
    for raw in raw_steps.iter().take(MAX_PLAN_STEPS) {
        let tool = raw.get("tool")?.as_str()?.to_string();
        let mut step = PlanStep::new(
            tool.clone(),
            raw.get("args").cloned().unwrap_or(serde_json::json!({})),
            raw.get("description").and_then(|v| v.as_str()).unwrap_or_default(),
        )
        .with_expected_outcome(raw.get("expected_outcome").and_then(|v| v.as_str()).unwrap_or_default())
        .with_error_handling(raw.get("error_handling").and_then(|v| v.as_str()).unwrap_or("abort"))
        .with_confidence(raw.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.7) as f32);

        if !tool_names.iter().any(|t| t == &tool) {
            debug!(%tool, "parse_plan: replacing unregistered tool with echo");
            step.args = serde_json::json!({"message": format!("unavailable tool '{}': {}", tool, step.description)});
            step.tool = "echo".to_string();
        }
        plan.steps.push(step);
    }

    if plan.steps.is_empty() {
        return None;
    }

    // Pad short plans up to the floor with cheap inspection steps
    while plan.steps.len() < MIN_PLAN_STEPS {
        plan.steps.push(
            PlanStep::new(
                "echo",
                serde_json::json!({"message": "confirm the previous step's effect before proceeding"}),
                "confirmation checkpoint",
            )
            .with_confidence(0.9),
        );
    }

    if let Some(verification) = value.get("verification") {
        if let Some(check_command) = verification.get("check_command").and_then(|v| v.as_str()) {
            plan = plan.with_verification(
                check_command,
                verification.get("success_criteria").and_then(|v| v.as_str()).unwrap_or_default(),
            );
        }
    }

    plan.alternatives = value
        .get("alternatives")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    if plan.alternatives.is_empty() {
        plan.alternatives.push("retry with a simpler single-step variant".to_string());
    }

    Some(plan)
}

/// Heuristic fallback plan: inspect, act, confirm
pub fn heuristic_plan(ctx: &PlanContext) -> InstructionPlan {
    debug!(action = %ctx.action, "heuristic_plan: called");
    let has = |name: &str| ctx.tool_names.iter().any(|t| t == name);

    let mut plan = InstructionPlan::new(format!("Heuristic: {}", ctx.action)).with_source("heuristic_fallback");

    if has("read_dir") {
        plan.steps.push(
            PlanStep::new("read_dir", serde_json::json!({"path": "."}), "inspect the workspace").with_confidence(0.9),
        );
    } else {
        plan.steps.push(
            PlanStep::new("echo", serde_json::json!({"message": "inspecting workspace"}), "inspection note")
                .with_confidence(0.9),
        );
    }

    if has("run_bash") {
        let command = ctx
            .action
            .split_whitespace()
            .find(|w| w.starts_with("http"))
            .map(|url| format!("git clone {}", url))
            .unwrap_or_else(|| format!("echo {:?}", ctx.action));
        plan.steps.push(
            PlanStep::new("run_bash", serde_json::json!({"command": command}), ctx.action.clone())
                .with_error_handling("retry")
                .with_confidence(0.5),
        );
    } else {
        plan.steps.push(
            PlanStep::new("echo", serde_json::json!({"message": ctx.action}), ctx.action.clone()).with_confidence(0.5),
        );
    }

    plan.steps.push(
        PlanStep::new(
            "echo",
            serde_json::json!({"message": format!("completed attempt: {}", ctx.action)}),
            "record the attempt outcome",
        )
        .with_confidence(0.9),
    );

    plan.alternatives.push("engage the alternative planner for a wider search".to_string());
    plan
}

fn bulleted(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().map(|i| format!("- {}", i)).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, client::mock::MockLlmClient};

    fn ctx() -> PlanContext {
        PlanContext {
            action: "clone the repository at https://example.com/foo/bar".to_string(),
            goal: "Clone the repository and list its README".to_string(),
            task_type: TaskType::CodeGeneration,
            tool_names: vec![
                "run_bash".to_string(),
                "read_dir".to_string(),
                "read_file".to_string(),
                "echo".to_string(),
            ],
            tool_descriptions: "run_bash: shell\nread_dir: list\nread_file: read\necho: echo".to_string(),
            recent_history: vec![],
            recent_failures: vec![],
            cwd: "/workspace".to_string(),
            force_different_approach: false,
        }
    }

    fn llm_plan() -> serde_json::Value {
        serde_json::json!({
            "approach": "clone then read",
            "prerequisites": ["git available"],
            "steps": [
                {"tool": "run_bash", "args": {"command": "git --version"}, "description": "check git", "expected_outcome": "version string", "error_handling": "abort", "confidence": 0.9},
                {"tool": "run_bash", "args": {"command": "git clone https://example.com/foo/bar bar"}, "description": "clone", "expected_outcome": "cloned", "error_handling": "retry", "confidence": 0.8},
                {"tool": "read_dir", "args": {"path": "bar"}, "description": "list", "expected_outcome": "entries", "error_handling": "abort", "confidence": 0.9},
                {"tool": "read_file", "args": {"path": "bar/README.md"}, "description": "read readme", "expected_outcome": "content", "error_handling": "skip", "confidence": 0.85},
            ],
            "verification": {"check_command": "test -d bar", "success_criteria": "clone directory exists"},
            "alternatives": ["download a tarball instead of cloning"],
        })
    }

    #[tokio::test]
    async fn test_llm_plan_parsed() {
        let llm = Arc::new(MockLlmClient::new(vec![ChatResponse::json(llm_plan())]));
        let planner = TaskPlanner::with_llm(llm);
        let outcome = planner.plan(&ctx()).await;

        assert!(!outcome.fallback_used);
        assert_eq!(outcome.plan.steps.len(), 4);
        assert!(outcome.plan.verification.is_some());
        assert_eq!(outcome.plan.steps[0].tool, "run_bash");
        assert!(!outcome.plan.alternatives.is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_uses_heuristic() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let planner = TaskPlanner::with_llm(llm);
        let outcome = planner.plan(&ctx()).await;

        assert!(outcome.fallback_used);
        assert_eq!(outcome.plan.source, "heuristic_fallback");
        assert!(outcome.plan.steps.len() >= MIN_PLAN_STEPS);
    }

    #[tokio::test]
    async fn test_unregistered_tool_replaced() {
        let plan_with_bad_tool = serde_json::json!({
            "approach": "x",
            "steps": [
                {"tool": "teleport", "args": {}, "description": "zap", "confidence": 0.9},
                {"tool": "run_bash", "args": {"command": "ls"}, "description": "list", "confidence": 0.9},
                {"tool": "echo", "args": {"message": "done"}, "description": "done", "confidence": 0.9},
            ],
        });
        let llm = Arc::new(MockLlmClient::new(vec![ChatResponse::json(plan_with_bad_tool)]));
        let planner = TaskPlanner::with_llm(llm);
        let outcome = planner.plan(&ctx()).await;
        assert_eq!(outcome.plan.steps[0].tool, "echo");
    }

    #[tokio::test]
    async fn test_cache_hit_after_success() {
        let llm = Arc::new(MockLlmClient::new(vec![ChatResponse::json(llm_plan())]));
        let planner = TaskPlanner::with_llm(llm);
        let ctx = ctx();

        let first = planner.plan(&ctx).await;
        planner.record_success(&ctx, &first.plan);

        // LLM script exhausted: next plan comes from the cache, not the heuristic
        let second = planner.plan(&ctx).await;
        assert!(second.fallback_used);
        assert_eq!(second.plan.source, "cached");
        assert_eq!(second.plan.steps.len(), first.plan.steps.len());
    }

    #[tokio::test]
    async fn test_short_plan_padded_to_floor() {
        let short_plan = serde_json::json!({
            "approach": "one-liner",
            "steps": [{"tool": "run_bash", "args": {"command": "ls"}, "description": "list", "confidence": 0.9}],
        });
        let llm = Arc::new(MockLlmClient::new(vec![ChatResponse::json(short_plan)]));
        let planner = TaskPlanner::with_llm(llm);
        let outcome = planner.plan(&ctx()).await;
        assert!(outcome.plan.steps.len() >= MIN_PLAN_STEPS);
    }
}
