//! Feedback, calibration, and checkpoint record stores
//!
//! Feedback is bounded (default 5000 entries, oldest evicted) because it
//! accumulates across every session in a workspace. Calibration records
//! and resolved checkpoints are small and kept unbounded.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::store::{JsonlStore, StoreError};

/// Default bound on retained feedback entries
pub const DEFAULT_FEEDBACK_MAX_ENTRIES: usize = 5000;

/// Where a piece of feedback came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    Decision,
    Approval,
    Checkpoint,
    System,
    General,
}

/// One user feedback entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Unique id (time-ordered)
    pub id: String,

    /// What the feedback is about
    pub category: FeedbackCategory,

    /// Optional 1-5 rating
    pub rating: Option<u8>,

    /// Optional free-form reasoning
    pub reasoning: Option<String>,

    /// Optional improvement suggestion
    pub suggestion: Option<String>,

    /// Free-form tags
    pub tags: Vec<String>,

    /// Correlated session id
    pub session_id: Option<String>,

    /// Correlated iteration
    pub iteration: Option<u32>,

    /// Correlated decision / checkpoint id
    pub decision_id: Option<String>,

    /// When the feedback landed
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Create a new entry with a fresh id and current timestamp
    pub fn new(category: FeedbackCategory) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            category,
            rating: None,
            reasoning: None,
            suggestion: None,
            tags: Vec::new(),
            session_id: None,
            iteration: None,
            decision_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder: set rating
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating.clamp(1, 5));
        self
    }

    /// Builder: set reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Builder: set suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Builder: set correlation context
    pub fn with_context(mut self, session_id: impl Into<String>, iteration: u32, decision_id: Option<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.iteration = Some(iteration);
        self.decision_id = decision_id;
        self
    }
}

/// Bounded feedback store with oldest-first eviction
pub struct FeedbackStore {
    store: JsonlStore,
    max_entries: usize,
}

impl FeedbackStore {
    /// Open the feedback store under the given directory
    pub fn open(dir: impl AsRef<Path>, max_entries: usize) -> Result<Self, StoreError> {
        debug!(dir = %dir.as_ref().display(), max_entries, "FeedbackStore::open: called");
        Ok(Self {
            store: JsonlStore::open(dir.as_ref().join("feedback.jsonl"))?,
            max_entries: max_entries.max(1),
        })
    }

    /// Append one feedback entry, evicting the oldest beyond the bound
    pub fn record(&self, record: &FeedbackRecord) -> Result<(), StoreError> {
        debug!(id = %record.id, category = ?record.category, "FeedbackStore::record: called");
        self.store.append(record)?;

        // Compact once the file holds double the bound; readers always
        // trim to the bound regardless.
        let entries: Vec<FeedbackRecord> = self.store.read_all()?;
        if entries.len() > self.max_entries * 2 {
            let start = entries.len() - self.max_entries;
            debug!(evicting = start, "FeedbackStore::record: compacting");
            self.store.rewrite(&entries[start..])?;
        }
        Ok(())
    }

    /// Retained entries, oldest first, trimmed to the bound
    pub fn read_all(&self) -> Result<Vec<FeedbackRecord>, StoreError> {
        let mut entries: Vec<FeedbackRecord> = self.store.read_all()?;
        if entries.len() > self.max_entries {
            entries.drain(..entries.len() - self.max_entries);
        }
        Ok(entries)
    }
}

/// One predicted-vs-accepted observation for confidence calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Decision type name (plan, strategy, parameter, execution)
    pub decision_type: String,

    /// Confidence the evaluator predicted
    pub predicted_confidence: f32,

    /// Whether the user accepted the recommendation
    pub user_accepted: bool,

    /// When the observation landed
    pub timestamp: DateTime<Utc>,
}

/// Append-only calibration observations
pub struct CalibrationStore {
    store: JsonlStore,
}

impl CalibrationStore {
    /// Open the calibration store under the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(dir = %dir.as_ref().display(), "CalibrationStore::open: called");
        Ok(Self {
            store: JsonlStore::open(dir.as_ref().join("calibration.jsonl"))?,
        })
    }

    /// Append one observation
    pub fn record(&self, record: &CalibrationRecord) -> Result<(), StoreError> {
        debug!(decision_type = %record.decision_type, predicted = record.predicted_confidence, "CalibrationStore::record: called");
        self.store.append(record)
    }

    /// All observations, oldest first
    pub fn read_all(&self) -> Result<Vec<CalibrationRecord>, StoreError> {
        self.store.read_all()
    }
}

/// Persisted checkpoint state (pending or terminal)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Checkpoint id
    pub id: String,

    /// Decision type name
    pub decision_type: String,

    /// Predicted confidence that triggered the checkpoint
    pub predicted_confidence: f32,

    /// Serialized options shown to the user
    pub options: serde_json::Value,

    /// "pending" | "resolved" | "expired"
    pub status: String,

    /// Selected option id, once resolved
    pub selected_option_id: Option<String>,

    /// Whether the user modified the selected option
    pub modified: bool,

    /// Resolving user, if any
    pub user_id: Option<String>,

    /// Session the checkpoint belongs to
    pub session_id: String,

    /// When the checkpoint was created
    pub created_at: DateTime<Utc>,

    /// When it reached a terminal status
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Append-only checkpoint audit trail
///
/// Each state change appends a full record; the latest record per id
/// wins. A resolved checkpoint is never reopened, only superseded by a
/// new checkpoint with a fresh id.
pub struct CheckpointStore {
    store: JsonlStore,
}

impl CheckpointStore {
    /// Open the checkpoint store under the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(dir = %dir.as_ref().display(), "CheckpointStore::open: called");
        Ok(Self {
            store: JsonlStore::open(dir.as_ref().join("checkpoints.jsonl"))?,
        })
    }

    /// Append one checkpoint state
    pub fn record(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        debug!(id = %record.id, status = %record.status, "CheckpointStore::record: called");
        self.store.append(record)
    }

    /// Latest state per checkpoint id, oldest first
    pub fn read_latest(&self) -> Result<Vec<CheckpointRecord>, StoreError> {
        let records: Vec<CheckpointRecord> = self.store.read_all()?;
        let mut latest: Vec<CheckpointRecord> = Vec::new();
        for record in records {
            if let Some(existing) = latest.iter_mut().find(|r| r.id == record.id) {
                *existing = record;
            } else {
                latest.push(record);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_feedback_bound_evicts_oldest() {
        let temp = tempdir().unwrap();
        let store = FeedbackStore::open(temp.path(), 3).unwrap();

        for i in 0..8 {
            let record = FeedbackRecord::new(FeedbackCategory::General).with_reasoning(format!("entry {}", i));
            store.record(&record).unwrap();
        }

        let entries = store.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].reasoning.as_deref(), Some("entry 7"));
        assert_eq!(entries[0].reasoning.as_deref(), Some("entry 5"));
    }

    #[test]
    fn test_feedback_builder() {
        let record = FeedbackRecord::new(FeedbackCategory::Checkpoint)
            .with_rating(9)
            .with_reasoning("too risky")
            .with_context("sess-1", 4, Some("cp-1".to_string()));
        assert_eq!(record.rating, Some(5)); // clamped
        assert_eq!(record.iteration, Some(4));
        assert_eq!(record.decision_id.as_deref(), Some("cp-1"));
    }

    #[test]
    fn test_checkpoint_latest_wins() {
        let temp = tempdir().unwrap();
        let store = CheckpointStore::open(temp.path()).unwrap();

        let mut record = CheckpointRecord {
            id: "cp-1".to_string(),
            decision_type: "execution".to_string(),
            predicted_confidence: 0.82,
            options: serde_json::json!([]),
            status: "pending".to_string(),
            selected_option_id: None,
            modified: false,
            user_id: None,
            session_id: "sess-1".to_string(),
            created_at: Utc::now(),
            resolved_at: None,
        };
        store.record(&record).unwrap();

        record.status = "resolved".to_string();
        record.selected_option_id = Some("opt-low-risk".to_string());
        record.resolved_at = Some(Utc::now());
        store.record(&record).unwrap();

        let latest = store.read_latest().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].status, "resolved");
        assert_eq!(latest[0].selected_option_id.as_deref(), Some("opt-low-risk"));
    }

    #[test]
    fn test_calibration_roundtrip() {
        let temp = tempdir().unwrap();
        let store = CalibrationStore::open(temp.path()).unwrap();
        store
            .record(&CalibrationRecord {
                decision_type: "plan".to_string(),
                predicted_confidence: 0.65,
                user_accepted: true,
                timestamp: Utc::now(),
            })
            .unwrap();
        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].user_accepted);
    }
}
