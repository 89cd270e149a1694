//! Recovery pattern store
//!
//! Every executed recovery lands here as one outcome record. Aggregation
//! by (error category, strategy name) answers "what has actually worked
//! for this kind of failure" - the learner on top derives confidence
//! boosts from these aggregates rather than storing them.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{JsonlStore, StoreError};

/// Max example contexts retained per aggregate
const MAX_EXAMPLES: usize = 3;

/// One recovery attempt and how it went
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Classifier taxonomy name (e.g. "command_not_found")
    pub error_category: String,

    /// Strategy that was executed (e.g. "install-dependency")
    pub strategy: String,

    /// Whether the following iteration succeeded
    pub success: bool,

    /// Iterations the recovery consumed before resolution
    pub iterations: u32,

    /// Short context snippet (task or failing command)
    pub context: String,

    /// When the outcome was recorded
    pub timestamp: DateTime<Utc>,
}

/// Aggregate for one (error category, strategy) pair
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternRecord {
    /// Successful recoveries
    pub success_count: u32,

    /// Failed recoveries
    pub failure_count: u32,

    /// Mean iterations across all outcomes
    pub avg_iterations: f32,

    /// A few example contexts
    pub examples: Vec<String>,
}

impl PatternRecord {
    /// success / (success + failure); 0.0 with no data
    pub fn success_rate(&self) -> f32 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f32 / total as f32
        }
    }
}

/// Append-only store of recovery outcomes
pub struct PatternStore {
    store: JsonlStore,
}

impl PatternStore {
    /// Open the pattern store under the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(dir = %dir.as_ref().display(), "PatternStore::open: called");
        Ok(Self {
            store: JsonlStore::open(dir.as_ref().join("recovery_patterns.jsonl"))?,
        })
    }

    /// Record one recovery outcome
    pub fn record(&self, outcome: &RecoveryOutcome) -> Result<(), StoreError> {
        debug!(
            category = %outcome.error_category,
            strategy = %outcome.strategy,
            success = outcome.success,
            "PatternStore::record: called"
        );
        self.store.append(outcome)
    }

    /// Aggregate all outcomes by (category, strategy)
    pub fn aggregates(&self) -> Result<HashMap<(String, String), PatternRecord>, StoreError> {
        debug!("PatternStore::aggregates: called");
        let outcomes: Vec<RecoveryOutcome> = self.store.read_all()?;
        let mut map: HashMap<(String, String), (PatternRecord, u64, u64)> = HashMap::new();

        for outcome in outcomes {
            let key = (outcome.error_category.clone(), outcome.strategy.clone());
            let (record, iter_sum, count) = map.entry(key).or_default();
            if outcome.success {
                record.success_count += 1;
            } else {
                record.failure_count += 1;
            }
            *iter_sum += u64::from(outcome.iterations);
            *count += 1;
            if record.examples.len() < MAX_EXAMPLES && !outcome.context.is_empty() {
                record.examples.push(outcome.context);
            }
        }

        let aggregated = map
            .into_iter()
            .map(|(key, (mut record, iter_sum, count))| {
                record.avg_iterations = if count == 0 { 0.0 } else { iter_sum as f32 / count as f32 };
                (key, record)
            })
            .collect();
        Ok(aggregated)
    }

    /// Aggregate for one (category, strategy) pair
    pub fn aggregate_for(&self, category: &str, strategy: &str) -> Result<Option<PatternRecord>, StoreError> {
        let key = (category.to_string(), strategy.to_string());
        Ok(self.aggregates()?.remove(&key))
    }

    /// Most successful strategy for a category, by success count then rate
    pub fn best_strategy(&self, category: &str) -> Result<Option<(String, PatternRecord)>, StoreError> {
        debug!(%category, "PatternStore::best_strategy: called");
        let aggregates = self.aggregates()?;
        let best = aggregates
            .into_iter()
            .filter(|((cat, _), _)| cat == category)
            .max_by(|(_, a), (_, b)| {
                a.success_count
                    .cmp(&b.success_count)
                    .then(a.success_rate().partial_cmp(&b.success_rate()).unwrap_or(std::cmp::Ordering::Equal))
            })
            .map(|((_, strategy), record)| (strategy, record));
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn outcome(category: &str, strategy: &str, success: bool, iterations: u32) -> RecoveryOutcome {
        RecoveryOutcome {
            error_category: category.to_string(),
            strategy: strategy.to_string(),
            success,
            iterations,
            context: "git clone failed".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_aggregation() {
        let temp = tempdir().unwrap();
        let store = PatternStore::open(temp.path()).unwrap();

        store.record(&outcome("command_not_found", "install-dependency", true, 2)).unwrap();
        store.record(&outcome("command_not_found", "install-dependency", true, 4)).unwrap();
        store.record(&outcome("command_not_found", "use-alternative-command", false, 1)).unwrap();

        let aggregates = store.aggregates().unwrap();
        let record = &aggregates[&("command_not_found".to_string(), "install-dependency".to_string())];
        assert_eq!(record.success_count, 2);
        assert_eq!(record.failure_count, 0);
        assert!((record.avg_iterations - 3.0).abs() < f32::EPSILON);
        assert_eq!(record.success_rate(), 1.0);
    }

    #[test]
    fn test_best_strategy_prefers_success_count() {
        let temp = tempdir().unwrap();
        let store = PatternStore::open(temp.path()).unwrap();

        store.record(&outcome("timeout", "retry-with-longer-timeout", true, 1)).unwrap();
        store.record(&outcome("timeout", "retry-with-longer-timeout", true, 2)).unwrap();
        store.record(&outcome("timeout", "split-into-smaller-steps", true, 1)).unwrap();

        let (strategy, record) = store.best_strategy("timeout").unwrap().unwrap();
        assert_eq!(strategy, "retry-with-longer-timeout");
        assert_eq!(record.success_count, 2);
    }

    #[test]
    fn test_best_strategy_missing_category() {
        let temp = tempdir().unwrap();
        let store = PatternStore::open(temp.path()).unwrap();
        assert!(store.best_strategy("network").unwrap().is_none());
    }
}
