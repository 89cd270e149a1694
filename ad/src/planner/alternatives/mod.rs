//! Alternative planner
//!
//! generate -> estimate effort -> check alignment -> evaluate -> choose.
//! Engaged when reflection confidence is low or at critical decision
//! points; the chosen alternative converts into an executable plan.

mod alignment;
mod effort;
mod evaluate;
mod generate;

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{EvalWeights, InstructionPlan, PlanStep, RankedDecision};
use crate::llm::LlmClient;

pub use alignment::{AlignmentChecker, heuristic_alignment};
pub use effort::{EffortContext, estimate_effort};
pub use evaluate::evaluate;
pub use generate::{
    AlternativeGenerator, GenerateContext, GeneratedSet, GenerationMethod, MAX_ALTERNATIVES, MIN_ALTERNATIVES,
    diversity, heuristic_alternatives, repair_tool_references,
};

/// The full alternative planning pipeline
pub struct AlternativePlanner {
    generator: AlternativeGenerator,
    checker: AlignmentChecker,
    weights: EvalWeights,
}

impl AlternativePlanner {
    /// Heuristic-only planner
    pub fn heuristic() -> Self {
        debug!("AlternativePlanner::heuristic: called");
        Self {
            generator: AlternativeGenerator::heuristic(),
            checker: AlignmentChecker::heuristic(),
            weights: EvalWeights::default(),
        }
    }

    /// LLM-backed planner with heuristic fallbacks
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        debug!("AlternativePlanner::with_llm: called");
        Self {
            generator: AlternativeGenerator::with_llm(llm.clone()),
            checker: AlignmentChecker::with_llm(llm),
            weights: EvalWeights::default(),
        }
    }

    /// Builder: override the evaluator weights
    pub fn with_weights(mut self, weights: EvalWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Run the full pipeline: generate, estimate, align, rank, choose
    pub async fn plan(&self, generate_ctx: &GenerateContext, effort_ctx: &EffortContext) -> (RankedDecision, GenerationMethod) {
        debug!(action = %generate_ctx.next_action, "AlternativePlanner::plan: called");
        let set = self.generator.generate(generate_ctx).await;
        let method = set.method;

        let mut efforts = Vec::with_capacity(set.alternatives.len());
        let mut alignments = Vec::with_capacity(set.alternatives.len());
        for alternative in &set.alternatives {
            efforts.push(estimate_effort(alternative, effort_ctx));
            alignments.push(self.checker.check(&generate_ctx.goal, alternative).await);
        }

        let decision = evaluate(set.alternatives, efforts, alignments, self.weights);
        info!(
            chosen = decision.chosen().map(|c| c.alternative.name.as_str()).unwrap_or("-"),
            method = ?method,
            "AlternativePlanner::plan: decided"
        );
        (decision, method)
    }
}

/// Convert the chosen alternative into an executable plan
pub fn decision_to_plan(decision: &RankedDecision) -> Option<InstructionPlan> {
    let winner = decision.chosen()?;
    debug!(name = %winner.alternative.name, "decision_to_plan: called");

    let mut plan = InstructionPlan::new(format!("{}: {}", winner.alternative.name, winner.alternative.description))
        .with_source("alternative");
    plan.prerequisites = winner.alternative.prerequisites.clone();
    for step in &winner.alternative.steps {
        plan.steps.push(
            PlanStep::new(step.tool.clone(), step.args.clone(), step.description.clone())
                .with_expected_outcome(step.expected_outcome.clone())
                .with_confidence(winner.alternative.confidence),
        );
    }
    // Losing alternatives become the plan's textual alternatives
    plan.alternatives = decision
        .ranked
        .iter()
        .skip(1)
        .map(|r| format!("{}: {}", r.alternative.name, r.alternative.description))
        .collect();
    Some(plan)
}
