//! User preference inference
//!
//! Accepted-vs-rejected recommendations and feedback habits are distilled
//! into a coarse profile the planner can condition on. Inference needs a
//! minimum sample size per dimension; below it the dimension stays at
//! its neutral default with zero confidence.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::feedback::FeedbackRecord;
use crate::store::{JsonlStore, StoreError};

/// Minimum decisions before risk tolerance is inferred
const MIN_DECISIONS: usize = 10;

/// Minimum feedback entries before decision speed is inferred
const MIN_FEEDBACK: usize = 5;

/// How much risk the user tolerates in recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Exploratory,
    Aggressive,
}

/// How quickly the user resolves decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSpeed {
    Deliberate,
    #[default]
    Balanced,
    Quick,
}

/// One observed user decision (checkpoint resolution)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Checkpoint / decision id
    pub decision_id: String,

    /// Whether the user picked the lowest-risk option offered
    pub safest_chosen: bool,

    /// Whether the user accepted the recommended option
    pub accepted: bool,

    /// When the decision landed
    pub timestamp: DateTime<Utc>,
}

/// A recognized behavioral pattern with its observed frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferencePattern {
    pub name: String,
    pub frequency: f32,
}

/// Inferred user profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub risk_tolerance: RiskTolerance,
    /// Confidence in the risk tolerance inference [0,1]
    pub risk_confidence: f32,
    pub decision_speed: DecisionSpeed,
    /// Confidence in the decision speed inference [0,1]
    pub speed_confidence: f32,
    pub patterns: Vec<PreferencePattern>,
    pub total_decisions: usize,
    pub total_feedback: usize,
}

/// Store of observed decisions plus the inference on top
pub struct PreferenceStore {
    decisions: JsonlStore,
}

impl PreferenceStore {
    /// Open the preference store under the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(dir = %dir.as_ref().display(), "PreferenceStore::open: called");
        Ok(Self {
            decisions: JsonlStore::open(dir.as_ref().join("preference_decisions.jsonl"))?,
        })
    }

    /// Record one observed decision
    pub fn record_decision(&self, record: &DecisionRecord) -> Result<(), StoreError> {
        debug!(id = %record.decision_id, safest = record.safest_chosen, "PreferenceStore::record_decision: called");
        self.decisions.append(record)
    }

    /// All observed decisions, oldest first
    pub fn read_decisions(&self) -> Result<Vec<DecisionRecord>, StoreError> {
        self.decisions.read_all()
    }

    /// Infer the user profile from decisions plus feedback entries
    pub fn analyze(&self, feedback: &[FeedbackRecord]) -> Result<UserProfile, StoreError> {
        debug!(feedback = feedback.len(), "PreferenceStore::analyze: called");
        let decisions = self.read_decisions()?;
        Ok(infer_profile(&decisions, feedback))
    }
}

/// Pure inference over observed decisions and feedback
pub fn infer_profile(decisions: &[DecisionRecord], feedback: &[FeedbackRecord]) -> UserProfile {
    debug!(decisions = decisions.len(), feedback = feedback.len(), "infer_profile: called");
    let mut profile = UserProfile {
        total_decisions: decisions.len(),
        total_feedback: feedback.len(),
        ..Default::default()
    };

    if decisions.len() >= MIN_DECISIONS {
        let safest_rate = decisions.iter().filter(|d| d.safest_chosen).count() as f32 / decisions.len() as f32;
        profile.risk_tolerance = if safest_rate >= 0.8 {
            RiskTolerance::Conservative
        } else if safest_rate >= 0.6 {
            RiskTolerance::Moderate
        } else if safest_rate >= 0.4 {
            RiskTolerance::Exploratory
        } else {
            RiskTolerance::Aggressive
        };
        profile.risk_confidence = (decisions.len() as f32 / 20.0).min(1.0);
        debug!(safest_rate, tolerance = ?profile.risk_tolerance, "infer_profile: risk tolerance inferred");
    }

    if feedback.len() >= MIN_FEEDBACK {
        let reasoning_rate = feedback.iter().filter(|f| f.reasoning.is_some()).count() as f32 / feedback.len() as f32;
        profile.decision_speed = if reasoning_rate > 0.7 {
            DecisionSpeed::Deliberate
        } else if reasoning_rate >= 0.3 {
            DecisionSpeed::Balanced
        } else {
            DecisionSpeed::Quick
        };
        profile.speed_confidence = (feedback.len() as f32 / 20.0).min(1.0);
        debug!(reasoning_rate, speed = ?profile.decision_speed, "infer_profile: decision speed inferred");
    }

    if !feedback.is_empty() {
        let suggestion_rate = feedback.iter().filter(|f| f.suggestion.is_some()).count() as f32 / feedback.len() as f32;
        if suggestion_rate > 0.3 {
            profile.patterns.push(PreferencePattern {
                name: "proactive_feedback".to_string(),
                frequency: suggestion_rate,
            });
        }
    }
    if !decisions.is_empty() {
        let acceptance_rate = decisions.iter().filter(|d| d.accepted).count() as f32 / decisions.len() as f32;
        if acceptance_rate >= 0.8 {
            profile.patterns.push(PreferencePattern {
                name: "high_alignment".to_string(),
                frequency: acceptance_rate,
            });
        }
    }

    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackCategory;
    use tempfile::tempdir;

    fn decision(safest: bool, accepted: bool) -> DecisionRecord {
        DecisionRecord {
            decision_id: uuid::Uuid::now_v7().to_string(),
            safest_chosen: safest,
            accepted,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_conservative_inference() {
        let decisions: Vec<DecisionRecord> = (0..10).map(|i| decision(i < 9, true)).collect();
        let profile = infer_profile(&decisions, &[]);
        assert_eq!(profile.risk_tolerance, RiskTolerance::Conservative);
        assert!(profile.risk_confidence > 0.0);
        assert!(profile.patterns.iter().any(|p| p.name == "high_alignment"));
    }

    #[test]
    fn test_aggressive_inference() {
        let decisions: Vec<DecisionRecord> = (0..12).map(|i| decision(i < 3, false)).collect();
        let profile = infer_profile(&decisions, &[]);
        assert_eq!(profile.risk_tolerance, RiskTolerance::Aggressive);
    }

    #[test]
    fn test_insufficient_decisions_stay_neutral() {
        let decisions: Vec<DecisionRecord> = (0..4).map(|_| decision(false, false)).collect();
        let profile = infer_profile(&decisions, &[]);
        assert_eq!(profile.risk_tolerance, RiskTolerance::Moderate);
        assert_eq!(profile.risk_confidence, 0.0);
    }

    #[test]
    fn test_deliberate_speed_from_reasoning() {
        let feedback: Vec<FeedbackRecord> = (0..6)
            .map(|_| FeedbackRecord::new(FeedbackCategory::Decision).with_reasoning("because"))
            .collect();
        let profile = infer_profile(&[], &feedback);
        assert_eq!(profile.decision_speed, DecisionSpeed::Deliberate);
    }

    #[test]
    fn test_store_roundtrip() {
        let temp = tempdir().unwrap();
        let store = PreferenceStore::open(temp.path()).unwrap();
        for _ in 0..11 {
            store.record_decision(&decision(true, true)).unwrap();
        }
        let profile = store.analyze(&[]).unwrap();
        assert_eq!(profile.total_decisions, 11);
        assert_eq!(profile.risk_tolerance, RiskTolerance::Conservative);
    }
}
