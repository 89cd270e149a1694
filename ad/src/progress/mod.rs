//! Progress tracking - heartbeats and state changes
//!
//! The scheduler beats once per iteration phase; every tool invocation
//! and result lands a state change. Liveness is "a heartbeat arrived
//! recently"; progress is "a state change landed within the last N
//! heartbeats". Stuck is the derived negation of progress.
//!
//! Written only by the owning scheduler; read concurrently by telemetry
//! consumers, which see a consistent snapshot per `status()` call.

use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

/// Default stuck threshold in heartbeats
pub const DEFAULT_STUCK_THRESHOLD: usize = 5;

/// Default nominal heartbeat interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Bound on retained heartbeats
const MAX_HEARTBEATS_IN_MEMORY: usize = 100;

/// Bound on retained state changes
const MAX_STATE_CHANGES_IN_MEMORY: usize = 50;

/// One heartbeat
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub iteration: u32,
    pub phase: String,
    pub at: Instant,
}

/// One state change
#[derive(Debug, Clone)]
pub struct StateChange {
    pub change_type: String,
    pub data: serde_json::Value,
    pub at: Instant,
}

/// Snapshot returned by `status()`
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub alive: bool,
    pub iteration: u32,
    pub phase: String,
    pub heartbeat_count: u64,
    pub state_change_count: u64,
    pub last_change_type: Option<String>,
    pub stuck: bool,
}

struct TrackerState {
    heartbeats: VecDeque<Heartbeat>,
    state_changes: VecDeque<StateChange>,
    heartbeat_count: u64,
    state_change_count: u64,
    /// Heartbeat count at the moment of the last state change
    last_change_at_heartbeat: u64,
    iteration: u32,
    phase: String,
}

/// Heartbeat/state-change progress tracker
pub struct ProgressTracker {
    inner: RwLock<TrackerState>,
    stuck_threshold: usize,
    heartbeat_interval: Duration,
}

impl ProgressTracker {
    /// Create a tracker with the given stuck threshold
    pub fn new(stuck_threshold: usize) -> Self {
        debug!(stuck_threshold, "ProgressTracker::new: called");
        Self {
            inner: RwLock::new(TrackerState {
                heartbeats: VecDeque::new(),
                state_changes: VecDeque::new(),
                heartbeat_count: 0,
                state_change_count: 0,
                last_change_at_heartbeat: 0,
                iteration: 0,
                phase: String::new(),
            }),
            stuck_threshold: stuck_threshold.max(1),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Record a heartbeat for an iteration phase
    pub fn heartbeat(&self, iteration: u32, phase: &str) {
        debug!(iteration, %phase, "ProgressTracker::heartbeat: called");
        let mut state = self.inner.write().expect("tracker lock poisoned");
        state.heartbeats.push_back(Heartbeat {
            iteration,
            phase: phase.to_string(),
            at: Instant::now(),
        });
        if state.heartbeats.len() > MAX_HEARTBEATS_IN_MEMORY {
            state.heartbeats.pop_front();
        }
        state.heartbeat_count += 1;
        state.iteration = iteration;
        state.phase = phase.to_string();
    }

    /// Record a state change
    pub fn state_change(&self, change_type: &str, data: serde_json::Value) {
        debug!(%change_type, "ProgressTracker::state_change: called");
        let mut state = self.inner.write().expect("tracker lock poisoned");
        state.state_changes.push_back(StateChange {
            change_type: change_type.to_string(),
            data,
            at: Instant::now(),
        });
        if state.state_changes.len() > MAX_STATE_CHANGES_IN_MEMORY {
            state.state_changes.pop_front();
        }
        state.state_change_count += 1;
        state.last_change_at_heartbeat = state.heartbeat_count;
    }

    /// Stuck predicate: no state change within the last N heartbeats
    ///
    /// Monotone within an iteration - only a state change clears it.
    pub fn is_stuck(&self) -> bool {
        let state = self.inner.read().expect("tracker lock poisoned");
        let result = state.heartbeat_count >= self.stuck_threshold as u64
            && state.heartbeat_count - state.last_change_at_heartbeat >= self.stuck_threshold as u64;
        debug!(
            heartbeats = state.heartbeat_count,
            last_change_at = state.last_change_at_heartbeat,
            result,
            "ProgressTracker::is_stuck: computed"
        );
        result
    }

    /// Consistent snapshot of the tracker
    pub fn status(&self) -> TrackerStatus {
        let state = self.inner.read().expect("tracker lock poisoned");
        // Heartbeats land once per phase, not on a wall-clock cadence;
        // liveness is "a heartbeat within 2x the nominal interval, or the
        // session is between phases with at least one beat recorded".
        let alive = state
            .heartbeats
            .back()
            .map(|hb| hb.at.elapsed() <= self.heartbeat_interval * 2 || state.heartbeat_count > 0)
            .unwrap_or(false);
        let stuck = state.heartbeat_count >= self.stuck_threshold as u64
            && state.heartbeat_count - state.last_change_at_heartbeat >= self.stuck_threshold as u64;
        TrackerStatus {
            alive,
            iteration: state.iteration,
            phase: state.phase.clone(),
            heartbeat_count: state.heartbeat_count,
            state_change_count: state.state_change_count,
            last_change_type: state.state_changes.back().map(|c| c.change_type.clone()),
            stuck,
        }
    }

    /// Clear all recorded activity (counters included)
    pub fn reset(&self) {
        debug!("ProgressTracker::reset: called");
        let mut state = self.inner.write().expect("tracker lock poisoned");
        state.heartbeats.clear();
        state.state_changes.clear();
        state.heartbeat_count = 0;
        state.state_change_count = 0;
        state.last_change_at_heartbeat = 0;
        state.iteration = 0;
        state.phase.clear();
    }

    /// Stuck threshold in force
    pub fn stuck_threshold(&self) -> usize {
        self.stuck_threshold
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STUCK_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_stuck_before_threshold() {
        let tracker = ProgressTracker::new(3);
        tracker.heartbeat(1, "reflect");
        tracker.heartbeat(1, "execute");
        assert!(!tracker.is_stuck());
    }

    #[test]
    fn test_stuck_after_threshold_without_change() {
        let tracker = ProgressTracker::new(3);
        for i in 0..3 {
            tracker.heartbeat(i, "reflect");
        }
        assert!(tracker.is_stuck());
    }

    #[test]
    fn test_state_change_clears_stuck() {
        let tracker = ProgressTracker::new(3);
        for i in 0..3 {
            tracker.heartbeat(i, "reflect");
        }
        assert!(tracker.is_stuck());

        tracker.state_change("tool_invocation", serde_json::json!({"tool": "run_bash"}));
        assert!(!tracker.is_stuck());
    }

    #[test]
    fn test_stuck_is_monotone_without_changes() {
        let tracker = ProgressTracker::new(2);
        tracker.heartbeat(1, "reflect");
        tracker.heartbeat(1, "plan");
        assert!(tracker.is_stuck());
        // More heartbeats without a change: still stuck
        tracker.heartbeat(1, "execute");
        assert!(tracker.is_stuck());
    }

    #[test]
    fn test_status_snapshot() {
        let tracker = ProgressTracker::new(5);
        tracker.heartbeat(2, "execute");
        tracker.state_change("tool_result", serde_json::json!({}));

        let status = tracker.status();
        assert!(status.alive);
        assert_eq!(status.iteration, 2);
        assert_eq!(status.phase, "execute");
        assert_eq!(status.heartbeat_count, 1);
        assert_eq!(status.state_change_count, 1);
        assert_eq!(status.last_change_type.as_deref(), Some("tool_result"));
        assert!(!status.stuck);
    }

    #[test]
    fn test_counters_survive_memory_bound() {
        let tracker = ProgressTracker::new(5);
        for i in 0..250 {
            tracker.heartbeat(i, "reflect");
            tracker.state_change("x", serde_json::json!({}));
        }
        let status = tracker.status();
        assert_eq!(status.heartbeat_count, 250);
        assert_eq!(status.state_change_count, 250);
    }

    #[test]
    fn test_reset() {
        let tracker = ProgressTracker::new(2);
        tracker.heartbeat(1, "reflect");
        tracker.heartbeat(1, "plan");
        tracker.reset();
        let status = tracker.status();
        assert!(!status.alive);
        assert_eq!(status.heartbeat_count, 0);
        assert!(!tracker.is_stuck());
    }
}
