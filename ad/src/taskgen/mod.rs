//! Task generation lifecycle
//!
//! External analyzers watch the session's telemetry and propose task
//! cards; the core only manages their funnel. Auto-approval is gated on
//! an analyzer allowlist plus a confidence floor and always leaves an
//! audit event. Batch actions are capped; a card with open prerequisites
//! is never actionable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{FunnelMetrics, TaskCard, TaskCardStatus};
use crate::events::{ContextEvent, ContextLog};

/// Default batch operation ceiling
pub const TASKGEN_BATCH_MAX: usize = 50;

/// Auto-approval policy
#[derive(Debug, Clone)]
pub struct AutoApprovalPolicy {
    /// Whether auto-approval is enabled at all
    pub enabled: bool,

    /// Minimum analyzer confidence
    pub min_confidence: f32,

    /// Analyzers allowed to auto-approve
    pub trusted_analyzers: Vec<String>,
}

impl Default for AutoApprovalPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_confidence: 0.9,
            trusted_analyzers: Vec::new(),
        }
    }
}

/// Batch action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Approve,
    Dismiss,
}

impl BatchAction {
    fn as_str(&self) -> &'static str {
        match self {
            BatchAction::Approve => "approve",
            BatchAction::Dismiss => "dismiss",
        }
    }
}

/// Manages task cards generated during a session
pub struct TaskGenManager {
    cards: Mutex<HashMap<String, TaskCard>>,
    policy: AutoApprovalPolicy,
    batch_max: usize,
    log: Option<Arc<ContextLog>>,
    session_id: String,
}

impl TaskGenManager {
    /// Create a manager for one session
    pub fn new(session_id: impl Into<String>, policy: AutoApprovalPolicy) -> Self {
        let session_id = session_id.into();
        debug!(%session_id, enabled = policy.enabled, "TaskGenManager::new: called");
        Self {
            cards: Mutex::new(HashMap::new()),
            policy,
            batch_max: TASKGEN_BATCH_MAX,
            log: None,
            session_id,
        }
    }

    /// Builder: emit audit events into the given context log
    pub fn with_log(mut self, log: Arc<ContextLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Builder: override the batch ceiling
    pub fn with_batch_max(mut self, batch_max: usize) -> Self {
        self.batch_max = batch_max.max(1);
        self
    }

    /// Ingest a freshly generated card, applying auto-approval
    pub fn ingest(&self, mut card: TaskCard) -> TaskCard {
        debug!(id = %card.id, analyzer = %card.analyzer, confidence = card.confidence, "TaskGenManager::ingest: called");

        if self.should_auto_approve(&card) {
            card.status = TaskCardStatus::Approved;
            card.auto_approved = true;
            info!(id = %card.id, analyzer = %card.analyzer, "TaskGenManager::ingest: auto-approved");
            if let Some(log) = &self.log {
                log.emit(ContextEvent::TaskAutoApproved {
                    session_id: self.session_id.clone(),
                    card_id: card.id.clone(),
                    analyzer: card.analyzer.clone(),
                    confidence: card.confidence,
                });
            }
        }

        let mut cards = self.cards.lock().expect("taskgen lock poisoned");
        cards.insert(card.id.clone(), card.clone());
        card
    }

    /// Auto-approval requires the allowlist AND the confidence floor
    fn should_auto_approve(&self, card: &TaskCard) -> bool {
        self.policy.enabled
            && self.policy.trusted_analyzers.iter().any(|a| a == &card.analyzer)
            && card.confidence >= self.policy.min_confidence
    }

    /// Mark a card viewed
    pub fn mark_viewed(&self, card_id: &str) {
        let mut cards = self.cards.lock().expect("taskgen lock poisoned");
        if let Some(card) = cards.get_mut(card_id) {
            if card.status == TaskCardStatus::Generated {
                card.status = TaskCardStatus::Viewed;
            }
        }
    }

    /// Mark a card completed
    pub fn mark_completed(&self, card_id: &str) {
        let mut cards = self.cards.lock().expect("taskgen lock poisoned");
        if let Some(card) = cards.get_mut(card_id) {
            card.status = TaskCardStatus::Completed;
        }
    }

    /// Batch approve/dismiss, capped at the batch ceiling
    ///
    /// Returns the ids actually updated; requests beyond the cap are
    /// dropped, not deferred.
    pub fn batch(&self, action: BatchAction, card_ids: &[String]) -> Vec<String> {
        debug!(action = action.as_str(), requested = card_ids.len(), "TaskGenManager::batch: called");
        if card_ids.len() > self.batch_max {
            warn!(
                requested = card_ids.len(),
                max = self.batch_max,
                "TaskGenManager::batch: request exceeds ceiling, truncating"
            );
        }

        let mut applied = Vec::new();
        let mut cards = self.cards.lock().expect("taskgen lock poisoned");
        for card_id in card_ids.iter().take(self.batch_max) {
            if let Some(card) = cards.get_mut(card_id) {
                card.status = match action {
                    BatchAction::Approve => TaskCardStatus::Approved,
                    BatchAction::Dismiss => TaskCardStatus::Dismissed,
                };
                applied.push(card_id.clone());
            }
        }
        drop(cards);

        if let Some(log) = &self.log {
            log.emit(ContextEvent::TaskBatchAction {
                session_id: self.session_id.clone(),
                action: action.as_str().to_string(),
                requested: card_ids.len(),
                applied: applied.len(),
            });
        }
        applied
    }

    /// Funnel metrics over a time window
    pub fn funnel(&self, since: DateTime<Utc>) -> FunnelMetrics {
        debug!(%since, "TaskGenManager::funnel: called");
        let cards = self.cards.lock().expect("taskgen lock poisoned");
        let mut metrics = FunnelMetrics::default();
        for card in cards.values().filter(|c| c.created_at >= since) {
            metrics.generated += 1;
            match card.status {
                TaskCardStatus::Generated => {}
                TaskCardStatus::Viewed => metrics.viewed += 1,
                TaskCardStatus::Approved => {
                    metrics.viewed += 1;
                    metrics.approved += 1;
                }
                TaskCardStatus::Completed => {
                    metrics.viewed += 1;
                    metrics.approved += 1;
                    metrics.completed += 1;
                }
                TaskCardStatus::Dismissed => metrics.dismissed += 1,
            }
        }
        metrics
    }

    /// A card is actionable only when all prerequisites are completed
    pub fn is_actionable(&self, card_id: &str) -> bool {
        let cards = self.cards.lock().expect("taskgen lock poisoned");
        let Some(card) = cards.get(card_id) else {
            return false;
        };
        card.prerequisites.iter().all(|prereq| {
            cards
                .get(prereq)
                .map(|p| p.status == TaskCardStatus::Completed)
                .unwrap_or(false)
        })
    }

    /// A card by id
    pub fn get(&self, card_id: &str) -> Option<TaskCard> {
        self.cards.lock().expect("taskgen lock poisoned").get(card_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trusting_policy() -> AutoApprovalPolicy {
        AutoApprovalPolicy {
            enabled: true,
            min_confidence: 0.9,
            trusted_analyzers: vec!["error-analyzer".to_string()],
        }
    }

    #[test]
    fn test_auto_approval_requires_allowlist_and_confidence() {
        let manager = TaskGenManager::new("sess-1", trusting_policy());

        let trusted_confident = manager.ingest(TaskCard::new("a", "error-analyzer", 0.95));
        assert_eq!(trusted_confident.status, TaskCardStatus::Approved);
        assert!(trusted_confident.auto_approved);

        let trusted_unsure = manager.ingest(TaskCard::new("b", "error-analyzer", 0.8));
        assert_eq!(trusted_unsure.status, TaskCardStatus::Generated);

        // High confidence but unlisted analyzer: never auto-approved
        let untrusted_confident = manager.ingest(TaskCard::new("c", "rogue-analyzer", 0.99));
        assert_eq!(untrusted_confident.status, TaskCardStatus::Generated);
        assert!(!untrusted_confident.auto_approved);
    }

    #[test]
    fn test_auto_approval_disabled() {
        let policy = AutoApprovalPolicy {
            enabled: false,
            ..trusting_policy()
        };
        let manager = TaskGenManager::new("sess-1", policy);
        let card = manager.ingest(TaskCard::new("a", "error-analyzer", 0.99));
        assert_eq!(card.status, TaskCardStatus::Generated);
    }

    #[test]
    fn test_batch_cap() {
        let manager = TaskGenManager::new("sess-1", AutoApprovalPolicy::default()).with_batch_max(3);
        let ids: Vec<String> = (0..5)
            .map(|i| manager.ingest(TaskCard::new(format!("card {}", i), "x", 0.5)).id)
            .collect();

        let applied = manager.batch(BatchAction::Approve, &ids);
        assert_eq!(applied.len(), 3);
        assert_eq!(manager.get(&ids[4]).unwrap().status, TaskCardStatus::Generated);
    }

    #[test]
    fn test_funnel_and_health() {
        let manager = TaskGenManager::new("sess-1", AutoApprovalPolicy::default());
        let a = manager.ingest(TaskCard::new("a", "x", 0.5)).id;
        let b = manager.ingest(TaskCard::new("b", "x", 0.5)).id;
        let _c = manager.ingest(TaskCard::new("c", "x", 0.5)).id;

        manager.mark_viewed(&a);
        manager.batch(BatchAction::Approve, &[a.clone()]);
        manager.mark_completed(&a);
        manager.batch(BatchAction::Dismiss, &[b]);

        let metrics = manager.funnel(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(metrics.generated, 3);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.dismissed, 1);
        assert!(metrics.health_score() > 0.0);
    }

    #[test]
    fn test_dependency_gating() {
        let manager = TaskGenManager::new("sess-1", AutoApprovalPolicy::default());
        let prereq = manager.ingest(TaskCard::new("first", "x", 0.5)).id;
        let card = manager
            .ingest(TaskCard::new("second", "x", 0.5).with_prerequisites(vec![prereq.clone()]))
            .id;

        assert!(!manager.is_actionable(&card));
        assert!(manager.is_actionable(&prereq));

        manager.mark_completed(&prereq);
        assert!(manager.is_actionable(&card));
    }

    #[test]
    fn test_missing_prerequisite_blocks() {
        let manager = TaskGenManager::new("sess-1", AutoApprovalPolicy::default());
        let card = manager
            .ingest(TaskCard::new("orphan", "x", 0.5).with_prerequisites(vec!["ghost".to_string()]))
            .id;
        assert!(!manager.is_actionable(&card));
    }
}
