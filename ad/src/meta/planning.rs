//! Planning feedback - scoring a plan after its execution
//!
//! Three signals: did the plan succeed, did execution use the tools the
//! plan named, and was the plan's confidence calibrated against the
//! outcome (high+success 1.0, high+fail 0.2, low+success 0.5, low+fail
//! 0.8 - low confidence before a failure is good calibration).

use tracing::debug;

use crate::domain::{InstructionPlan, PlanningFeedback};

/// Boundary between "high" and "low" plan confidence
const HIGH_PLAN_CONFIDENCE: f32 = 0.7;

/// Score one executed plan
pub fn score_planning(
    iteration: u32,
    plan: &InstructionPlan,
    plan_confidence: f32,
    tools_actually_used: &[String],
    plan_succeeded: bool,
) -> PlanningFeedback {
    debug!(iteration, plan_succeeded, "score_planning: called");

    let planned_tools = plan.tools();
    let tools_matched = if planned_tools.is_empty() {
        1.0
    } else {
        planned_tools
            .iter()
            .filter(|t| tools_actually_used.contains(t))
            .count() as f32
            / planned_tools.len() as f32
    };

    let high = plan_confidence >= HIGH_PLAN_CONFIDENCE;
    let confidence_calibration = match (high, plan_succeeded) {
        (true, true) => 1.0,
        (true, false) => 0.2,
        (false, true) => 0.5,
        (false, false) => 0.8,
    };

    debug!(tools_matched, confidence_calibration, "score_planning: computed");
    PlanningFeedback {
        iteration,
        plan_succeeded,
        tools_matched,
        confidence_calibration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlanStep;

    fn plan() -> InstructionPlan {
        InstructionPlan::new("x")
            .with_step(PlanStep::new("run_bash", serde_json::json!({}), "a"))
            .with_step(PlanStep::new("read_file", serde_json::json!({}), "b"))
    }

    #[test]
    fn test_calibration_mapping() {
        let p = plan();
        let used = vec!["run_bash".to_string(), "read_file".to_string()];
        assert_eq!(score_planning(1, &p, 0.9, &used, true).confidence_calibration, 1.0);
        assert_eq!(score_planning(1, &p, 0.9, &used, false).confidence_calibration, 0.2);
        assert_eq!(score_planning(1, &p, 0.4, &used, true).confidence_calibration, 0.5);
        assert_eq!(score_planning(1, &p, 0.4, &used, false).confidence_calibration, 0.8);
    }

    #[test]
    fn test_tools_matched_ratio() {
        let p = plan();
        let feedback = score_planning(1, &p, 0.8, &["run_bash".to_string()], true);
        assert!((feedback.tools_matched - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_plan_matches_fully() {
        let p = InstructionPlan::new("empty");
        let feedback = score_planning(1, &p, 0.8, &[], true);
        assert_eq!(feedback.tools_matched, 1.0);
    }
}
