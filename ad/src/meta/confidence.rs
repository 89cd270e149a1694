//! Five-factor decision confidence
//!
//! Each decision type weighs the same five factors differently; the
//! weighted sum decides whether a checkpoint is needed. Factor values
//! are all in [0,1] and the weight rows sum to 1.

use tracing::debug;

use crate::domain::DecisionType;

/// The five confidence factors, each in [0,1]
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceFactors {
    /// How clearly one option dominates
    pub option_clarity: f32,

    /// Historical success for this kind of work
    pub historical_success: f32,

    /// How well the plan's risk matches what the user tolerates
    pub risk_alignment: f32,

    /// How tight the effort estimate is
    pub effort_certainty: f32,

    /// How much of the desired context was actually available
    pub context_completeness: f32,
}

impl ConfidenceFactors {
    /// Clamp every factor into [0,1]
    pub fn clamped(self) -> Self {
        Self {
            option_clarity: self.option_clarity.clamp(0.0, 1.0),
            historical_success: self.historical_success.clamp(0.0, 1.0),
            risk_alignment: self.risk_alignment.clamp(0.0, 1.0),
            effort_certainty: self.effort_certainty.clamp(0.0, 1.0),
            context_completeness: self.context_completeness.clamp(0.0, 1.0),
        }
    }
}

/// Per-decision-type weight row
#[derive(Debug, Clone, Copy)]
pub struct FactorWeights {
    pub option_clarity: f32,
    pub historical_success: f32,
    pub risk_alignment: f32,
    pub effort_certainty: f32,
    pub context_completeness: f32,
}

impl FactorWeights {
    /// The weight row for a decision type
    pub fn for_decision(decision_type: DecisionType) -> Self {
        match decision_type {
            DecisionType::Plan => Self {
                option_clarity: 0.25,
                historical_success: 0.15,
                risk_alignment: 0.20,
                effort_certainty: 0.25,
                context_completeness: 0.15,
            },
            DecisionType::Strategy => Self {
                option_clarity: 0.30,
                historical_success: 0.25,
                risk_alignment: 0.20,
                effort_certainty: 0.15,
                context_completeness: 0.10,
            },
            DecisionType::Parameter => Self {
                option_clarity: 0.20,
                historical_success: 0.30,
                risk_alignment: 0.15,
                effort_certainty: 0.10,
                context_completeness: 0.25,
            },
            DecisionType::Execution => Self {
                option_clarity: 0.15,
                historical_success: 0.25,
                risk_alignment: 0.35,
                effort_certainty: 0.15,
                context_completeness: 0.10,
            },
        }
    }

    /// Sum of the row (1.0 by construction)
    pub fn sum(&self) -> f32 {
        self.option_clarity + self.historical_success + self.risk_alignment + self.effort_certainty + self.context_completeness
    }
}

/// Weighted confidence for a decision
pub fn score_confidence(decision_type: DecisionType, factors: ConfidenceFactors) -> f32 {
    let factors = factors.clamped();
    let weights = FactorWeights::for_decision(decision_type);
    let score = weights.option_clarity * factors.option_clarity
        + weights.historical_success * factors.historical_success
        + weights.risk_alignment * factors.risk_alignment
        + weights.effort_certainty * factors.effort_certainty
        + weights.context_completeness * factors.context_completeness;
    debug!(%decision_type, score, "score_confidence: computed");
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(value: f32) -> ConfidenceFactors {
        ConfidenceFactors {
            option_clarity: value,
            historical_success: value,
            risk_alignment: value,
            effort_certainty: value,
            context_completeness: value,
        }
    }

    #[test]
    fn test_weight_rows_sum_to_one() {
        for decision_type in [
            DecisionType::Plan,
            DecisionType::Strategy,
            DecisionType::Parameter,
            DecisionType::Execution,
        ] {
            let sum = FactorWeights::for_decision(decision_type).sum();
            assert!((sum - 1.0).abs() < 1e-6, "{:?} sums to {}", decision_type, sum);
        }
    }

    #[test]
    fn test_uniform_factors_score_that_value() {
        for decision_type in [DecisionType::Plan, DecisionType::Execution] {
            let score = score_confidence(decision_type, uniform(0.6));
            assert!((score - 0.6).abs() < 1e-6);
        }
    }

    #[test]
    fn test_execution_weighs_risk_most() {
        let risky = ConfidenceFactors {
            risk_alignment: 0.1,
            ..uniform(0.9)
        };
        let plan_score = score_confidence(DecisionType::Plan, risky);
        let exec_score = score_confidence(DecisionType::Execution, risky);
        assert!(exec_score < plan_score);
    }

    #[test]
    fn test_factors_are_clamped() {
        let wild = ConfidenceFactors {
            option_clarity: 7.0,
            historical_success: -2.0,
            risk_alignment: 0.5,
            effort_certainty: 0.5,
            context_completeness: 0.5,
        };
        let score = score_confidence(DecisionType::Plan, wild);
        assert!((0.0..=1.0).contains(&score));
    }
}
