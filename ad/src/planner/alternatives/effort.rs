//! Effort estimation for alternatives
//!
//! Complexity from step count, tool novelty, and argument weight; risk
//! from destructive steps, external dependencies, and past failure
//! rates; iteration estimates from episodes of the same task type.

use tracing::debug;

use crate::domain::{Alternative, EffortEstimate, IterationEstimate, Level};

/// Historical inputs to estimation
#[derive(Debug, Clone, Default)]
pub struct EffortContext {
    /// Tools the session has already used
    pub known_tools: Vec<String>,

    /// Failure rate [0,1] observed for this task type
    pub past_failure_rate: f32,

    /// (min, avg, max) iterations from episodes of this task type
    pub iteration_stats: Option<(u32, f32, u32)>,

    /// Session iteration ceiling
    pub max_iterations: u32,
}

/// Estimate effort for one alternative
pub fn estimate_effort(alternative: &Alternative, ctx: &EffortContext) -> EffortEstimate {
    debug!(alt = %alternative.id, steps = alternative.steps.len(), "estimate_effort: called");

    // Complexity: step count + novelty + argument weight, each on a 0-10 axis
    let step_factor = (alternative.steps.len() as f32 * 1.2).min(4.0);
    let novel_tools = alternative
        .steps
        .iter()
        .filter(|s| !ctx.known_tools.iter().any(|t| t == &s.tool))
        .count();
    let novelty_factor = (novel_tools as f32 * 1.5).min(3.0);
    let args_factor = (alternative
        .steps
        .iter()
        .map(|s| args_weight(&s.args))
        .sum::<f32>()
        / alternative.steps.len().max(1) as f32)
        .min(3.0);
    let complexity_score = (step_factor + novelty_factor + args_factor).clamp(0.0, 10.0);

    // Risk: destructive steps dominate, then external dependencies, then history
    let destructive = alternative
        .steps
        .iter()
        .filter(|s| {
            let text = format!("{} {}", s.description, s.args).to_lowercase();
            ["rm -", "rmdir", "delete", "remove", "force push", "truncate"]
                .iter()
                .any(|m| text.contains(m))
        })
        .count();
    let external = alternative
        .steps
        .iter()
        .filter(|s| s.tool == "http_fetch" || format!("{}", s.args).contains("http"))
        .count();
    let risk_score =
        ((destructive as f32 * 3.0) + (external as f32 * 1.5) + (ctx.past_failure_rate * 3.0)).clamp(0.0, 10.0);

    // Iterations: anchor on history for the task type when it exists
    let iterations = match ctx.iteration_stats {
        Some((min, avg, max)) => IterationEstimate {
            min: min.max(1),
            point: (avg.round() as u32).max(1).min(ctx.max_iterations.max(1)),
            max: max.max(1).min(ctx.max_iterations.max(1)),
        },
        None => {
            let point = (1 + alternative.steps.len() as u32 / 3).min(ctx.max_iterations.max(1));
            IterationEstimate {
                min: 1,
                point,
                max: (point * 2).min(ctx.max_iterations.max(1)),
            }
        }
    };

    debug!(
        alt = %alternative.id,
        complexity_score,
        risk_score,
        point = iterations.point,
        "estimate_effort: computed"
    );

    EffortEstimate {
        alternative_id: alternative.id.clone(),
        complexity_score,
        complexity_level: Level::from_score(complexity_score),
        risk_score,
        risk_level: Level::from_score(risk_score),
        iterations,
    }
}

/// Argument weight on a 1-3 scale: low 1-3 keys, medium 4-6, high 7+
fn args_weight(args: &serde_json::Value) -> f32 {
    let key_count = args.as_object().map(|o| o.len()).unwrap_or(0);
    if key_count <= 3 {
        1.0
    } else if key_count <= 6 {
        2.0
    } else {
        3.0
    }
}
