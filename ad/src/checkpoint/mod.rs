//! Checkpoint manager - suspended decisions awaiting a human
//!
//! Creating a checkpoint persists it as pending and hands back a
//! receiver the scheduler awaits (with a timeout). Resolution happens
//! exactly once; a second resolve is rejected. Expired checkpoints are
//! marked terminal and the scheduler proceeds with the original plan.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use agentmemory::{CheckpointRecord, MemoryStores};

use crate::domain::{Checkpoint, CheckpointResolution};

/// Default wait before a checkpoint expires
pub const DEFAULT_CHECKPOINT_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from checkpoint lifecycle operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Unknown checkpoint: {id}")]
    Unknown { id: String },

    #[error("Checkpoint already resolved: {id}")]
    AlreadyResolved { id: String },

    #[error("Invalid option '{option}' for checkpoint {id}")]
    InvalidOption { id: String, option: String },
}

/// How a wait on a checkpoint ended
#[derive(Debug)]
pub enum CheckpointWait {
    /// A human resolved it
    Resolved(CheckpointResolution),
    /// The wait timed out; the checkpoint is now expired
    Expired,
}

struct PendingEntry {
    checkpoint: Checkpoint,
    tx: Option<oneshot::Sender<CheckpointResolution>>,
}

/// Owns pending checkpoints for a process
pub struct CheckpointManager {
    pending: Mutex<HashMap<String, PendingEntry>>,
    memory: Arc<MemoryStores>,
}

impl CheckpointManager {
    /// Create a manager persisting into the given memory bundle
    pub fn new(memory: Arc<MemoryStores>) -> Self {
        debug!("CheckpointManager::new: called");
        Self {
            pending: Mutex::new(HashMap::new()),
            memory,
        }
    }

    /// Register a checkpoint and get the receiver for its resolution
    pub fn create(&self, checkpoint: Checkpoint) -> oneshot::Receiver<CheckpointResolution> {
        debug!(id = %checkpoint.id, decision_type = %checkpoint.decision_type, "CheckpointManager::create: called");
        let (tx, rx) = oneshot::channel();

        self.persist(&checkpoint, "pending");
        let mut pending = self.pending.lock().expect("checkpoint lock poisoned");
        pending.insert(
            checkpoint.id.clone(),
            PendingEntry {
                checkpoint,
                tx: Some(tx),
            },
        );
        rx
    }

    /// Await a checkpoint's resolution, expiring it on timeout
    pub async fn wait(&self, checkpoint_id: &str, rx: oneshot::Receiver<CheckpointResolution>, timeout: Duration) -> CheckpointWait {
        debug!(%checkpoint_id, ?timeout, "CheckpointManager::wait: called");
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resolution)) => {
                info!(%checkpoint_id, option = %resolution.selected_option_id, "CheckpointManager::wait: resolved");
                CheckpointWait::Resolved(resolution)
            }
            Ok(Err(_)) | Err(_) => {
                warn!(%checkpoint_id, "CheckpointManager::wait: expired");
                self.expire(checkpoint_id);
                CheckpointWait::Expired
            }
        }
    }

    /// Resolve a pending checkpoint - exactly once
    pub fn resolve(&self, checkpoint_id: &str, resolution: CheckpointResolution) -> Result<Checkpoint, CheckpointError> {
        debug!(%checkpoint_id, option = %resolution.selected_option_id, "CheckpointManager::resolve: called");
        let mut pending = self.pending.lock().expect("checkpoint lock poisoned");
        let entry = pending.get_mut(checkpoint_id).ok_or_else(|| CheckpointError::Unknown {
            id: checkpoint_id.to_string(),
        })?;

        if entry.checkpoint.resolution.is_some() || entry.tx.is_none() {
            return Err(CheckpointError::AlreadyResolved {
                id: checkpoint_id.to_string(),
            });
        }
        if !entry.checkpoint.options.iter().any(|o| o.id == resolution.selected_option_id) {
            return Err(CheckpointError::InvalidOption {
                id: checkpoint_id.to_string(),
                option: resolution.selected_option_id.clone(),
            });
        }

        entry.checkpoint.resolution = Some(resolution.clone());
        self.persist(&entry.checkpoint, "resolved");

        // Waking the waiter may fail if it already timed out; the
        // resolution still stands in the record.
        if let Some(tx) = entry.tx.take() {
            let _ = tx.send(resolution);
        }
        Ok(entry.checkpoint.clone())
    }

    /// Mark a checkpoint expired
    fn expire(&self, checkpoint_id: &str) {
        let mut pending = self.pending.lock().expect("checkpoint lock poisoned");
        if let Some(entry) = pending.get_mut(checkpoint_id) {
            if entry.checkpoint.resolution.is_none() {
                entry.tx = None;
                self.persist(&entry.checkpoint, "expired");
            }
        }
    }

    /// A pending checkpoint by id, for display
    pub fn get(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        let pending = self.pending.lock().expect("checkpoint lock poisoned");
        pending.get(checkpoint_id).map(|e| e.checkpoint.clone())
    }

    /// Ids of checkpoints still awaiting resolution
    pub fn pending_ids(&self) -> Vec<String> {
        let pending = self.pending.lock().expect("checkpoint lock poisoned");
        pending
            .values()
            .filter(|e| e.checkpoint.resolution.is_none() && e.tx.is_some())
            .map(|e| e.checkpoint.id.clone())
            .collect()
    }

    fn persist(&self, checkpoint: &Checkpoint, status: &str) {
        let record = CheckpointRecord {
            id: checkpoint.id.clone(),
            decision_type: checkpoint.decision_type.as_str().to_string(),
            predicted_confidence: checkpoint.predicted_confidence,
            options: serde_json::to_value(&checkpoint.options).unwrap_or(serde_json::Value::Null),
            status: status.to_string(),
            selected_option_id: checkpoint.resolution.as_ref().map(|r| r.selected_option_id.clone()),
            modified: checkpoint.resolution.as_ref().map(|r| r.modified).unwrap_or(false),
            user_id: checkpoint.resolution.as_ref().and_then(|r| r.user_id.clone()),
            session_id: checkpoint.session_id.clone(),
            created_at: checkpoint.created_at,
            resolved_at: (status != "pending").then(Utc::now),
        };
        if let Err(e) = self.memory.checkpoints.record(&record) {
            warn!(id = %checkpoint.id, error = %e, "CheckpointManager: failed to persist checkpoint record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckpointOption, DecisionType, RiskLevel};
    use tempfile::tempdir;

    fn checkpoint() -> Checkpoint {
        Checkpoint::new(
            "sess-1",
            DecisionType::Execution,
            0.82,
            vec![
                CheckpointOption {
                    id: "opt-safe".to_string(),
                    label: "safe".to_string(),
                    description: String::new(),
                    risk_level: RiskLevel::Low,
                    steps: vec![],
                },
                CheckpointOption {
                    id: "opt-fast".to_string(),
                    label: "fast".to_string(),
                    description: String::new(),
                    risk_level: RiskLevel::High,
                    steps: vec![],
                },
            ],
        )
    }

    fn manager() -> (CheckpointManager, tempfile::TempDir) {
        let temp = tempdir().unwrap();
        let memory = Arc::new(MemoryStores::open(temp.path().join("memory")).unwrap());
        (CheckpointManager::new(memory), temp)
    }

    #[tokio::test]
    async fn test_resolve_wakes_waiter() {
        let (manager, _temp) = manager();
        let cp = checkpoint();
        let id = cp.id.clone();
        let rx = manager.create(cp);

        manager
            .resolve(
                &id,
                CheckpointResolution {
                    selected_option_id: "opt-safe".to_string(),
                    modified: false,
                    user_id: Some("alice".to_string()),
                },
            )
            .unwrap();

        match manager.wait(&id, rx, Duration::from_secs(1)).await {
            CheckpointWait::Resolved(resolution) => {
                assert_eq!(resolution.selected_option_id, "opt-safe");
            }
            CheckpointWait::Expired => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn test_double_resolve_rejected() {
        let (manager, _temp) = manager();
        let cp = checkpoint();
        let id = cp.id.clone();
        let _rx = manager.create(cp);

        let resolution = CheckpointResolution {
            selected_option_id: "opt-safe".to_string(),
            modified: false,
            user_id: None,
        };
        manager.resolve(&id, resolution.clone()).unwrap();
        let second = manager.resolve(&id, resolution);
        assert!(matches!(second, Err(CheckpointError::AlreadyResolved { .. })));
    }

    #[tokio::test]
    async fn test_invalid_option_rejected() {
        let (manager, _temp) = manager();
        let cp = checkpoint();
        let id = cp.id.clone();
        let _rx = manager.create(cp);

        let result = manager.resolve(
            &id,
            CheckpointResolution {
                selected_option_id: "opt-imaginary".to_string(),
                modified: false,
                user_id: None,
            },
        );
        assert!(matches!(result, Err(CheckpointError::InvalidOption { .. })));
    }

    #[tokio::test]
    async fn test_timeout_expires() {
        let (manager, _temp) = manager();
        let cp = checkpoint();
        let id = cp.id.clone();
        let rx = manager.create(cp);

        match manager.wait(&id, rx, Duration::from_millis(20)).await {
            CheckpointWait::Expired => {}
            CheckpointWait::Resolved(_) => panic!("expected expiry"),
        }
        // Resolution after expiry is rejected
        let result = manager.resolve(
            &id,
            CheckpointResolution {
                selected_option_id: "opt-safe".to_string(),
                modified: false,
                user_id: None,
            },
        );
        assert!(matches!(result, Err(CheckpointError::AlreadyResolved { .. })));
    }

    #[tokio::test]
    async fn test_unknown_checkpoint() {
        let (manager, _temp) = manager();
        let result = manager.resolve(
            "nope",
            CheckpointResolution {
                selected_option_id: "x".to_string(),
                modified: false,
                user_id: None,
            },
        );
        assert!(matches!(result, Err(CheckpointError::Unknown { .. })));
    }
}
