//! Session memory log
//!
//! One record per terminal session, append-only. The aggregate statistics
//! feed planning prompts ("what usually works for this task type") and
//! the CLI stats view. Reloading the log must reproduce identical
//! aggregates.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{JsonlStore, StoreError};

/// Recovery attempt counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCounts {
    pub attempted: u32,
    pub succeeded: u32,
}

/// One terminal session, as remembered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMemoryRecord {
    /// Classified task type
    pub task_type: String,

    /// Whether the session completed successfully
    pub success: bool,

    /// Iterations consumed
    pub iterations: u32,

    /// Tools used across the session
    pub tools_used: Vec<String>,

    /// Tools that produced at least one classified error
    pub failed_tools: Vec<String>,

    /// Error categories encountered (classifier taxonomy names)
    pub error_categories: Vec<String>,

    /// Recovery attempt counters
    pub recoveries: RecoveryCounts,

    /// Whether the session looped on near-identical actions
    pub repetitive_actions: bool,

    /// Failure reason for unsuccessful sessions
    pub failure_reason: Option<String>,

    /// When the record was written
    pub timestamp: DateTime<Utc>,
}

/// Aggregated statistics over the session log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    /// Total sessions recorded
    pub total: u64,
    /// Successful sessions
    pub successes: u64,
    /// successes / total (0.0 when empty)
    pub success_rate: f32,
    /// Mean iterations per session
    pub avg_iterations: f32,
    /// Tool name -> times used
    pub tool_frequency: HashMap<String, u64>,
    /// Error category -> times seen
    pub failure_categories: HashMap<String, u64>,
    /// Per-task-type (sessions, successes)
    pub by_task_type: HashMap<String, (u64, u64)>,
    /// Recovery attempts across all sessions
    pub recoveries_attempted: u64,
    /// Recoveries that worked
    pub recoveries_succeeded: u64,
}

impl SessionStats {
    /// Success rate for one task type, if any sessions were recorded
    pub fn task_type_success_rate(&self, task_type: &str) -> Option<f32> {
        self.by_task_type.get(task_type).map(|(total, ok)| {
            if *total == 0 { 0.0 } else { *ok as f32 / *total as f32 }
        })
    }
}

/// Append-only log of terminal sessions
pub struct SessionLog {
    store: JsonlStore,
}

impl SessionLog {
    /// Open the session log under the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(dir = %dir.as_ref().display(), "SessionLog::open: called");
        Ok(Self {
            store: JsonlStore::open(dir.as_ref().join("session_memory.jsonl"))?,
        })
    }

    /// Append one terminal session record
    pub fn record(&self, record: &SessionMemoryRecord) -> Result<(), StoreError> {
        debug!(task_type = %record.task_type, success = record.success, "SessionLog::record: called");
        self.store.append(record)
    }

    /// All records, oldest first
    pub fn read_all(&self) -> Result<Vec<SessionMemoryRecord>, StoreError> {
        self.store.read_all()
    }

    /// Aggregate statistics over the whole log
    pub fn stats(&self) -> Result<SessionStats, StoreError> {
        debug!("SessionLog::stats: called");
        let records = self.read_all()?;
        let mut stats = SessionStats {
            total: records.len() as u64,
            ..Default::default()
        };

        let mut iteration_sum: u64 = 0;
        for record in &records {
            if record.success {
                stats.successes += 1;
            }
            iteration_sum += u64::from(record.iterations);
            for tool in &record.tools_used {
                *stats.tool_frequency.entry(tool.clone()).or_insert(0) += 1;
            }
            for category in &record.error_categories {
                *stats.failure_categories.entry(category.clone()).or_insert(0) += 1;
            }
            let entry = stats.by_task_type.entry(record.task_type.clone()).or_insert((0, 0));
            entry.0 += 1;
            if record.success {
                entry.1 += 1;
            }
            stats.recoveries_attempted += u64::from(record.recoveries.attempted);
            stats.recoveries_succeeded += u64::from(record.recoveries.succeeded);
        }

        if stats.total > 0 {
            stats.success_rate = stats.successes as f32 / stats.total as f32;
            stats.avg_iterations = iteration_sum as f32 / stats.total as f32;
        }

        debug!(total = stats.total, success_rate = stats.success_rate, "SessionLog::stats: computed");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(task_type: &str, success: bool, iterations: u32) -> SessionMemoryRecord {
        SessionMemoryRecord {
            task_type: task_type.to_string(),
            success,
            iterations,
            tools_used: vec!["run_bash".to_string(), "read_file".to_string()],
            failed_tools: if success { vec![] } else { vec!["run_bash".to_string()] },
            error_categories: if success { vec![] } else { vec!["command_not_found".to_string()] },
            recoveries: RecoveryCounts {
                attempted: u32::from(!success),
                succeeded: 0,
            },
            repetitive_actions: false,
            failure_reason: (!success).then(|| "validation failed".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_stats_aggregation() {
        let temp = tempdir().unwrap();
        let log = SessionLog::open(temp.path()).unwrap();

        log.record(&record("debugging", true, 3)).unwrap();
        log.record(&record("debugging", false, 7)).unwrap();
        log.record(&record("testing", true, 2)).unwrap();

        let stats = log.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successes, 2);
        assert!((stats.avg_iterations - 4.0).abs() < f32::EPSILON);
        assert_eq!(stats.tool_frequency["run_bash"], 3);
        assert_eq!(stats.failure_categories["command_not_found"], 1);
        assert_eq!(stats.task_type_success_rate("debugging"), Some(0.5));
    }

    #[test]
    fn test_reload_yields_identical_stats() {
        let temp = tempdir().unwrap();
        let before = {
            let log = SessionLog::open(temp.path()).unwrap();
            log.record(&record("analysis", true, 4)).unwrap();
            log.record(&record("analysis", false, 9)).unwrap();
            log.stats().unwrap()
        };

        let log = SessionLog::open(temp.path()).unwrap();
        let after = log.stats().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_empty_log_stats() {
        let temp = tempdir().unwrap();
        let log = SessionLog::open(temp.path()).unwrap();
        let stats = log.stats().unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.task_type_success_rate("anything").is_none());
    }
}
