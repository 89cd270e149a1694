//! Task card domain types
//!
//! Telemetry analyzers turn session activity into task cards. The core
//! only tracks their lifecycle: approval (auto or manual), batch actions,
//! funnel metrics, and prerequisite gating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a card sits in the funnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCardStatus {
    Generated,
    Viewed,
    Approved,
    Completed,
    Dismissed,
}

/// A generated task awaiting the funnel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCard {
    /// Unique id (time-ordered)
    pub id: String,

    /// Short title
    pub title: String,

    /// What the task is
    pub description: String,

    /// Analyzer that generated the card
    pub analyzer: String,

    /// Analyzer confidence [0,1]
    pub confidence: f32,

    /// Lifecycle status
    pub status: TaskCardStatus,

    /// Whether approval happened automatically
    pub auto_approved: bool,

    /// Prerequisite card ids that must complete first
    pub prerequisites: Vec<String>,

    /// When the card was generated
    pub created_at: DateTime<Utc>,
}

impl TaskCard {
    /// Create a freshly generated card
    pub fn new(title: impl Into<String>, analyzer: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            title: title.into(),
            description: String::new(),
            analyzer: analyzer.into(),
            confidence: confidence.clamp(0.0, 1.0),
            status: TaskCardStatus::Generated,
            auto_approved: false,
            prerequisites: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set prerequisites
    pub fn with_prerequisites(mut self, prerequisites: Vec<String>) -> Self {
        self.prerequisites = prerequisites;
        self
    }
}

/// Funnel counts over one time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelMetrics {
    pub generated: u64,
    pub viewed: u64,
    pub approved: u64,
    pub completed: u64,
    pub dismissed: u64,
}

impl FunnelMetrics {
    /// Health score: 0.3 * view rate + 0.3 * approve rate + 0.4 * complete rate
    pub fn health_score(&self) -> f32 {
        if self.generated == 0 {
            return 0.0;
        }
        let generated = self.generated as f32;
        let view_rate = self.viewed as f32 / generated;
        let approve_rate = self.approved as f32 / generated;
        let complete_rate = self.completed as f32 / generated;
        0.3 * view_rate + 0.3 * approve_rate + 0.4 * complete_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_score() {
        let metrics = FunnelMetrics {
            generated: 10,
            viewed: 10,
            approved: 5,
            completed: 5,
            dismissed: 2,
        };
        // 0.3*1.0 + 0.3*0.5 + 0.4*0.5 = 0.65
        assert!((metrics.health_score() - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_health_score_empty_window() {
        assert_eq!(FunnelMetrics::default().health_score(), 0.0);
    }
}
