//! Checkpoint domain types
//!
//! A checkpoint suspends a low-confidence decision until a human resolves
//! it. Once resolved a checkpoint is terminal; a changed mind means a new
//! checkpoint, never a reopened one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::plan::PlanStep;

/// What kind of decision the checkpoint gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Plan,
    Strategy,
    Parameter,
    Execution,
}

impl DecisionType {
    /// Default confidence threshold below which a checkpoint triggers
    pub fn default_threshold(&self) -> f32 {
        match self {
            DecisionType::Plan => 0.70,
            DecisionType::Strategy => 0.70,
            DecisionType::Parameter => 0.75,
            DecisionType::Execution => 0.90,
        }
    }

    /// Taxonomy name as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Plan => "plan",
            DecisionType::Strategy => "strategy",
            DecisionType::Parameter => "parameter",
            DecisionType::Execution => "execution",
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk band of one checkpoint option
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One option offered at a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointOption {
    /// Option id, unique within the checkpoint
    pub id: String,

    /// Short label
    pub label: String,

    /// What choosing it means
    pub description: String,

    /// Risk band
    pub risk_level: RiskLevel,

    /// Steps to substitute when this option is chosen
    pub steps: Vec<PlanStep>,
}

/// Resolution of a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointResolution {
    /// Chosen option id
    pub selected_option_id: String,

    /// Whether the user modified the option before accepting
    pub modified: bool,

    /// Resolving user, if known
    pub user_id: Option<String>,
}

/// A suspended decision awaiting resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique id (time-ordered)
    pub id: String,

    /// Decision type being gated
    pub decision_type: DecisionType,

    /// Confidence the evaluator predicted
    pub predicted_confidence: f32,

    /// Options ordered by ascending risk
    pub options: Vec<CheckpointOption>,

    /// Resolution, once terminal
    pub resolution: Option<CheckpointResolution>,

    /// Session the checkpoint belongs to
    pub session_id: String,

    /// When the checkpoint was created
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a pending checkpoint with options sorted by risk
    pub fn new(
        session_id: impl Into<String>,
        decision_type: DecisionType,
        predicted_confidence: f32,
        mut options: Vec<CheckpointOption>,
    ) -> Self {
        options.sort_by_key(|o| o.risk_level);
        Self {
            id: Uuid::now_v7().to_string(),
            decision_type,
            predicted_confidence,
            options,
            resolution: None,
            session_id: session_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the checkpoint is still awaiting a human
    pub fn is_pending(&self) -> bool {
        self.resolution.is_none()
    }

    /// The lowest-risk option (options are risk-sorted)
    pub fn safest_option(&self) -> Option<&CheckpointOption> {
        self.options.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: &str, risk: RiskLevel) -> CheckpointOption {
        CheckpointOption {
            id: id.to_string(),
            label: id.to_string(),
            description: String::new(),
            risk_level: risk,
            steps: vec![],
        }
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(DecisionType::Plan.default_threshold(), 0.70);
        assert_eq!(DecisionType::Execution.default_threshold(), 0.90);
    }

    #[test]
    fn test_options_sorted_by_risk() {
        let checkpoint = Checkpoint::new(
            "sess-1",
            DecisionType::Execution,
            0.82,
            vec![
                option("risky", RiskLevel::High),
                option("safe", RiskLevel::Low),
                option("middling", RiskLevel::Medium),
            ],
        );
        assert_eq!(checkpoint.options[0].id, "safe");
        assert_eq!(checkpoint.safest_option().unwrap().id, "safe");
        assert!(checkpoint.is_pending());
    }
}
