//! Reflection domain type

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The LLM's verdict on where the session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Continue,
    Stuck,
    Complete,
    NeedsClarification,
}

impl Assessment {
    /// Taxonomy name as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            Assessment::Continue => "continue",
            Assessment::Stuck => "stuck",
            Assessment::Complete => "complete",
            Assessment::NeedsClarification => "needs_clarification",
        }
    }
}

/// One reflection: assessment plus the proposed next action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// Iteration the reflection was produced for
    pub iteration: u32,

    /// Where the session stands
    pub assessment: Assessment,

    /// Predicted progress after the next action [0,100]
    pub predicted_progress: f32,

    /// Confidence in the assessment [0,1]
    pub confidence: f32,

    /// Free-form reasoning
    pub reasoning: String,

    /// Proposed next action
    pub next_action: String,

    /// Clarifying questions, when assessment is needs_clarification
    #[serde(default)]
    pub questions: Vec<String>,

    /// Set when this reflection is a degraded reuse of an earlier one
    #[serde(default)]
    pub degraded: bool,
}

impl Reflection {
    /// Parse a reflection from the LLM's JSON response
    pub fn from_json(iteration: u32, value: &serde_json::Value) -> Option<Self> {
        debug!(iteration, "Reflection::from_json: called");
        let assessment = match value.get("assessment")?.as_str()? {
            "continue" => Assessment::Continue,
            "stuck" => Assessment::Stuck,
            "complete" => Assessment::Complete,
            "needs_clarification" => Assessment::NeedsClarification,
            other => {
                debug!(%other, "Reflection::from_json: unknown assessment");
                return None;
            }
        };

        let questions = value
            .get("questions")
            .and_then(|q| q.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        Some(Self {
            iteration,
            assessment,
            predicted_progress: value.get("progress").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
            confidence: (value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32).clamp(0.0, 1.0),
            reasoning: value.get("reasoning").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            next_action: value.get("next_action").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            questions,
            degraded: false,
        })
    }
}
