//! Pattern learner - history-driven confidence boosts
//!
//! Boosts are derived from the pattern store's aggregates and applied to
//! a strategy's base confidence, never compounded onto an already
//! boosted value - applying the learner twice over the same history
//! yields identical confidences.

use agentmemory::{PatternRecord, PatternStore};
use tracing::{debug, warn};

use crate::domain::{RecoveryPlan, RecoveryStrategy};

/// Multiplier for a success count
fn boost_for_successes(successes: u32) -> f32 {
    match successes {
        0 => 1.0,
        1 => 1.05,
        2 => 1.15,
        3 | 4 => 1.30,
        _ => 1.50,
    }
}

/// Slowness penalty on the boost
fn slowness_factor(avg_iterations: f32) -> f32 {
    if avg_iterations > 5.0 {
        0.9
    } else if avg_iterations > 3.0 {
        0.95
    } else {
        1.0
    }
}

/// Adjusts recovery strategy confidence from historical outcomes
pub struct PatternLearner<'a> {
    store: &'a PatternStore,
}

impl<'a> PatternLearner<'a> {
    /// Create a learner over the given pattern store
    pub fn new(store: &'a PatternStore) -> Self {
        Self { store }
    }

    /// Apply learned boosts to every strategy in the plan
    ///
    /// Also fills the plan's historical success rate from the primary
    /// strategy's aggregate, when one exists.
    pub fn apply(&self, plan: &mut RecoveryPlan) {
        debug!(category = %plan.category, "PatternLearner::apply: called");
        let category = plan.category.as_str().to_string();

        let aggregates = match self.store.aggregates() {
            Ok(aggregates) => aggregates,
            Err(e) => {
                warn!(error = %e, "PatternLearner::apply: pattern store unreadable, leaving confidences");
                return;
            }
        };

        let mut boost_one = |strategy: &mut RecoveryStrategy| {
            let key = (category.clone(), strategy.name.clone());
            if let Some(record) = aggregates.get(&key) {
                let boost = boost_for_successes(record.success_count) * slowness_factor(record.avg_iterations);
                strategy.confidence = (strategy.base_confidence * boost).min(1.0);
                strategy.boost = Some(boost);
                debug!(
                    strategy = %strategy.name,
                    successes = record.success_count,
                    boost,
                    confidence = strategy.confidence,
                    "PatternLearner::apply: boosted"
                );
            } else {
                strategy.confidence = strategy.base_confidence;
                strategy.boost = None;
            }
        };

        boost_one(&mut plan.primary);
        for fallback in &mut plan.fallbacks {
            boost_one(fallback);
        }

        let primary_key = (category, plan.primary.name.clone());
        plan.historical_success_rate = aggregates.get(&primary_key).map(PatternRecord::success_rate);
    }

    /// The most successful strategy for a category, independent of a plan
    pub fn best_strategy(&self, category: &str) -> Option<(String, PatternRecord)> {
        debug!(%category, "PatternLearner::best_strategy: called");
        self.store.best_strategy(category).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCategory;
    use agentmemory::RecoveryOutcome;
    use chrono::Utc;
    use tempfile::tempdir;

    fn outcome(strategy: &str, success: bool, iterations: u32) -> RecoveryOutcome {
        RecoveryOutcome {
            error_category: "command_not_found".to_string(),
            strategy: strategy.to_string(),
            success,
            iterations,
            context: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn plan() -> RecoveryPlan {
        RecoveryPlan {
            category: ErrorCategory::CommandNotFound,
            primary: RecoveryStrategy::new("install-dependency", 0.65),
            fallbacks: vec![RecoveryStrategy::new("check-path", 0.35)],
            historical_success_rate: None,
        }
    }

    #[test]
    fn test_boost_schedule() {
        assert_eq!(boost_for_successes(0), 1.0);
        assert_eq!(boost_for_successes(1), 1.05);
        assert_eq!(boost_for_successes(2), 1.15);
        assert_eq!(boost_for_successes(3), 1.30);
        assert_eq!(boost_for_successes(4), 1.30);
        assert_eq!(boost_for_successes(5), 1.50);
        assert_eq!(boost_for_successes(12), 1.50);
    }

    #[test]
    fn test_slowness_penalty() {
        assert_eq!(slowness_factor(2.0), 1.0);
        assert_eq!(slowness_factor(4.0), 0.95);
        assert_eq!(slowness_factor(6.0), 0.9);
    }

    #[test]
    fn test_apply_boosts_from_history() {
        let temp = tempdir().unwrap();
        let store = PatternStore::open(temp.path()).unwrap();
        for _ in 0..2 {
            store.record(&outcome("install-dependency", true, 2)).unwrap();
        }

        let learner = PatternLearner::new(&store);
        let mut plan = plan();
        learner.apply(&mut plan);

        assert!((plan.primary.confidence - 0.65 * 1.15).abs() < 1e-6);
        assert_eq!(plan.primary.boost, Some(1.15));
        assert_eq!(plan.historical_success_rate, Some(1.0));
        // Fallback has no history: untouched
        assert_eq!(plan.fallbacks[0].confidence, 0.35);
        assert!(plan.fallbacks[0].boost.is_none());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = PatternStore::open(temp.path()).unwrap();
        for _ in 0..5 {
            store.record(&outcome("install-dependency", true, 2)).unwrap();
        }

        let learner = PatternLearner::new(&store);
        let mut plan = plan();
        learner.apply(&mut plan);
        let once = plan.primary.confidence;
        learner.apply(&mut plan);
        assert_eq!(plan.primary.confidence, once);
    }

    #[test]
    fn test_boost_caps_at_one() {
        let temp = tempdir().unwrap();
        let store = PatternStore::open(temp.path()).unwrap();
        for _ in 0..6 {
            store.record(&outcome("install-dependency", true, 1)).unwrap();
        }

        let learner = PatternLearner::new(&store);
        let mut plan = plan();
        plan.primary = RecoveryStrategy::new("install-dependency", 0.9);
        learner.apply(&mut plan);
        assert_eq!(plan.primary.confidence, 1.0);
    }

    #[test]
    fn test_best_strategy() {
        let temp = tempdir().unwrap();
        let store = PatternStore::open(temp.path()).unwrap();
        store.record(&outcome("install-dependency", true, 2)).unwrap();
        store.record(&outcome("check-path", false, 1)).unwrap();

        let learner = PatternLearner::new(&store);
        let (name, record) = learner.best_strategy("command_not_found").unwrap();
        assert_eq!(name, "install-dependency");
        assert_eq!(record.success_count, 1);
    }
}
