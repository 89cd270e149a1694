//! Plan cache
//!
//! Keyed on (task_type, normalized action, tool-set hash). An entry is
//! stored only after its plan's execution actually succeeded, and stays
//! valid for seven days or fifty successful reuses, whichever ends
//! first.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::InstructionPlan;

/// Default entry time-to-live
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(604_800);

/// Reuse ceiling per entry
const MAX_REUSES: u32 = 50;

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanCacheKey {
    pub task_type: String,
    pub normalized_action: String,
    pub tool_set_hash: u64,
}

impl PlanCacheKey {
    /// Build a key from raw inputs
    pub fn new(task_type: &str, action: &str, tool_names: &[String]) -> Self {
        Self {
            task_type: task_type.to_string(),
            normalized_action: normalize_action(action),
            tool_set_hash: hash_tool_set(tool_names),
        }
    }
}

struct CacheEntry {
    plan: InstructionPlan,
    stored_at: Instant,
    reuses: u32,
}

/// Success-gated plan cache
pub struct PlanCache {
    entries: HashMap<PlanCacheKey, CacheEntry>,
    ttl: Duration,
}

impl PlanCache {
    /// Create a cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        debug!(?ttl, "PlanCache::new: called");
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Store a plan whose execution succeeded
    pub fn store_success(&mut self, key: PlanCacheKey, plan: InstructionPlan) {
        debug!(action = %key.normalized_action, "PlanCache::store_success: called");
        self.entries.insert(
            key,
            CacheEntry {
                plan,
                stored_at: Instant::now(),
                reuses: 0,
            },
        );
    }

    /// Fetch a cached plan, counting the reuse
    ///
    /// Expired or reuse-exhausted entries are evicted on access.
    pub fn get(&mut self, key: &PlanCacheKey) -> Option<InstructionPlan> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.stored_at.elapsed() > self.ttl || entry.reuses >= MAX_REUSES,
            None => return None,
        };
        if expired {
            debug!(action = %key.normalized_action, "PlanCache::get: entry expired, evicting");
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key).expect("entry checked above");
        entry.reuses += 1;
        debug!(action = %key.normalized_action, reuses = entry.reuses, "PlanCache::get: hit");
        let mut plan = entry.plan.clone();
        plan.source = "cached".to_string();
        Some(plan)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase, collapse whitespace, strip punctuation
pub fn normalize_action(action: &str) -> String {
    action
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Order-independent FNV-1a hash over the tool set
pub fn hash_tool_set(tool_names: &[String]) -> u64 {
    let mut sorted: Vec<&String> = tool_names.iter().collect();
    sorted.sort();
    let mut hash: u64 = 0xcbf29ce484222325;
    for name in sorted {
        for byte in name.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash ^= 0xff;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Vec<String> {
        vec!["run_bash".to_string(), "echo".to_string()]
    }

    #[test]
    fn test_normalize_action() {
        assert_eq!(normalize_action("  Install   the Deps! "), "install the deps");
        assert_eq!(normalize_action("install-the-deps"), "install the deps");
    }

    #[test]
    fn test_tool_set_hash_is_order_independent() {
        let a = hash_tool_set(&["run_bash".to_string(), "echo".to_string()]);
        let b = hash_tool_set(&["echo".to_string(), "run_bash".to_string()]);
        assert_eq!(a, b);
        let c = hash_tool_set(&["echo".to_string()]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_store_and_get() {
        let mut cache = PlanCache::new(DEFAULT_CACHE_TTL);
        let key = PlanCacheKey::new("testing", "run the tests", &tools());
        cache.store_success(key.clone(), InstructionPlan::new("run tests"));

        let plan = cache.get(&key).unwrap();
        assert_eq!(plan.source, "cached");
        assert_eq!(plan.approach, "run tests");
    }

    #[test]
    fn test_miss_on_different_key() {
        let mut cache = PlanCache::new(DEFAULT_CACHE_TTL);
        let key = PlanCacheKey::new("testing", "run the tests", &tools());
        cache.store_success(key, InstructionPlan::new("run tests"));

        let other = PlanCacheKey::new("testing", "run the benchmarks", &tools());
        assert!(cache.get(&other).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = PlanCache::new(Duration::from_millis(0));
        let key = PlanCacheKey::new("testing", "run the tests", &tools());
        cache.store_success(key.clone(), InstructionPlan::new("run tests"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reuse_cap() {
        let mut cache = PlanCache::new(DEFAULT_CACHE_TTL);
        let key = PlanCacheKey::new("testing", "run the tests", &tools());
        cache.store_success(key.clone(), InstructionPlan::new("run tests"));
        for _ in 0..MAX_REUSES {
            assert!(cache.get(&key).is_some());
        }
        assert!(cache.get(&key).is_none());
    }
}
