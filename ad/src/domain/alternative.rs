//! Alternative planning domain types
//!
//! An alternative is one candidate way to carry out an action. The
//! planner generates 3-5, estimates effort and alignment for each, then
//! ranks them on four weighted dimensions.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One step of an alternative (not yet an executable plan step)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeStep {
    /// Tool name
    pub tool: String,

    /// Tool arguments
    pub args: serde_json::Value,

    /// What the step does
    pub description: String,

    /// What it should produce
    pub expected_outcome: String,
}

/// One candidate approach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    /// Locally unique id within the set (alt-1, alt-2, ...)
    pub id: String,

    /// Short name (e.g. "npm-install")
    pub name: String,

    /// What the approach is
    pub description: String,

    /// Ordered steps
    pub steps: Vec<AlternativeStep>,

    /// Assumptions the approach rests on
    pub assumptions: Vec<String>,

    /// Prerequisites that must hold
    pub prerequisites: Vec<String>,

    /// Generator confidence [0,1]
    pub confidence: f32,

    /// Set when an out-of-registry tool reference was replaced
    #[serde(default)]
    pub repaired_tools: Vec<String>,
}

impl Alternative {
    /// Tool sequence signature, for diversity checks
    pub fn tool_signature(&self) -> String {
        self.steps.iter().map(|s| s.tool.as_str()).collect::<Vec<_>>().join(">")
    }
}

/// Complexity or risk band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    /// Band for a 0-10 score: low 1-3, medium 4-6, high 7-10
    pub fn from_score(score: f32) -> Self {
        if score <= 3.0 {
            Level::Low
        } else if score <= 6.0 {
            Level::Medium
        } else {
            Level::High
        }
    }
}

/// Iteration estimate for an alternative
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IterationEstimate {
    pub min: u32,
    pub point: u32,
    pub max: u32,
}

/// Effort estimate for one alternative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffortEstimate {
    /// Alternative this estimate belongs to
    pub alternative_id: String,

    /// Complexity score 0-10
    pub complexity_score: f32,
    pub complexity_level: Level,

    /// Risk score 0-10
    pub risk_score: f32,
    pub risk_level: Level,

    /// Expected iterations to land the approach
    pub iterations: IterationEstimate,
}

/// How relevant an alternative is to the goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    Low,
    Medium,
    High,
}

impl Relevance {
    /// Band for an alignment score: low < 0.4, medium < 0.7, high >= 0.7
    pub fn from_score(score: f32) -> Self {
        if score < 0.4 {
            Relevance::Low
        } else if score < 0.7 {
            Relevance::Medium
        } else {
            Relevance::High
        }
    }
}

/// Alignment of one alternative with the task goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Alternative this result belongs to
    pub alternative_id: String,

    /// Alignment score [0,1]
    pub score: f32,

    /// Banded relevance
    pub relevance: Relevance,

    /// How the alternative contributes to the goal
    pub contribution: String,

    /// "heuristic" | "llm"
    pub method: String,
}

/// Evaluator weights over the four dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalWeights {
    pub effort: f32,
    pub risk: f32,
    pub alignment: f32,
    pub confidence: f32,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            effort: 0.30,
            risk: 0.25,
            alignment: 0.30,
            confidence: 0.15,
        }
    }
}

impl EvalWeights {
    /// Normalize so the weights sum to 1
    pub fn normalized(self) -> Self {
        let sum = self.effort + self.risk + self.alignment + self.confidence;
        debug!(sum, "EvalWeights::normalized: called");
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            effort: self.effort / sum,
            risk: self.risk / sum,
            alignment: self.alignment / sum,
            confidence: self.confidence / sum,
        }
    }

    /// Sum of the weight vector
    pub fn sum(&self) -> f32 {
        self.effort + self.risk + self.alignment + self.confidence
    }
}

/// Per-dimension contribution to an overall score
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub effort: f32,
    pub risk: f32,
    pub alignment: f32,
    pub confidence: f32,
}

impl ScoreBreakdown {
    /// Name and value of the weakest dimension
    pub fn lowest_factor(&self) -> (&'static str, f32) {
        let mut lowest = ("effort", self.effort);
        for (name, value) in [("risk", self.risk), ("alignment", self.alignment), ("confidence", self.confidence)] {
            if value < lowest.1 {
                lowest = (name, value);
            }
        }
        lowest
    }
}

/// One ranked alternative
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedAlternative {
    pub alternative: Alternative,
    pub effort: EffortEstimate,
    pub alignment: AlignmentResult,

    /// Weighted overall score
    pub overall_score: f32,

    /// Weighted per-dimension contributions
    pub breakdown: ScoreBreakdown,

    /// 1-based rank in the decision
    pub rank: usize,

    /// True for the winning alternative
    pub chosen: bool,
}

/// The ranked decision over an alternative set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDecision {
    /// Alternatives ordered non-increasing by overall score
    pub ranked: Vec<RankedAlternative>,

    /// Why the winner won
    pub justification: String,

    /// Weights used (normalized)
    pub weights: EvalWeights,
}

impl RankedDecision {
    /// The chosen alternative (rank 1)
    pub fn chosen(&self) -> Option<&RankedAlternative> {
        self.ranked.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_banding() {
        assert_eq!(Level::from_score(2.0), Level::Low);
        assert_eq!(Level::from_score(5.0), Level::Medium);
        assert_eq!(Level::from_score(8.5), Level::High);
    }

    #[test]
    fn test_relevance_banding() {
        assert_eq!(Relevance::from_score(0.39), Relevance::Low);
        assert_eq!(Relevance::from_score(0.5), Relevance::Medium);
        assert_eq!(Relevance::from_score(0.7), Relevance::High);
    }

    #[test]
    fn test_weights_normalize_to_one() {
        let weights = EvalWeights {
            effort: 3.0,
            risk: 1.0,
            alignment: 4.0,
            confidence: 2.0,
        }
        .normalized();
        assert!((weights.sum() - 1.0).abs() < 1e-6);
        assert!((weights.effort - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_lowest_factor() {
        let breakdown = ScoreBreakdown {
            effort: 0.24,
            risk: 0.20,
            alignment: 0.27,
            confidence: 0.05,
        };
        assert_eq!(breakdown.lowest_factor().0, "confidence");
    }
}
