//! Configuration types and loading
//!
//! Defaults cover every knob; an optional YAML file overrides them, and
//! `AD_`-prefixed environment variables override the file. `validate`
//! rejects out-of-range thresholds before a session starts.

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::DecisionType;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Iteration ceiling per session
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Checkpoint confidence thresholds per decision type
    pub checkpoints: CheckpointConfig,

    /// Planning knobs
    pub planning: PlanningConfig,

    /// Stuck threshold in heartbeats
    #[serde(rename = "stuck-threshold")]
    pub stuck_threshold: usize,

    /// Recovery confidence threshold
    #[serde(rename = "recovery-threshold")]
    pub recovery_threshold: f32,

    /// Feedback storage bound
    pub feedback: FeedbackConfig,

    /// Task generation auto-approval
    pub taskgen: TaskGenConfig,

    /// Memory substrate knobs
    pub memory: MemoryConfig,

    /// LLM reflection timeout in milliseconds
    #[serde(rename = "reflection-timeout-ms")]
    pub reflection_timeout_ms: u64,

    /// Per-tool-step timeout in milliseconds
    #[serde(rename = "step-timeout-ms")]
    pub step_timeout_ms: u64,

    /// Whole-session wall-clock budget in milliseconds (none by default)
    #[serde(rename = "session-budget-ms")]
    pub session_budget_ms: Option<u64>,

    /// Reflection confidence at or above which planning goes direct
    /// (skipping the alternative planner)
    #[serde(rename = "direct-planning-confidence")]
    pub direct_planning_confidence: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            max_iterations: 50,
            checkpoints: CheckpointConfig::default(),
            planning: PlanningConfig::default(),
            stuck_threshold: 5,
            recovery_threshold: 0.6,
            feedback: FeedbackConfig::default(),
            taskgen: TaskGenConfig::default(),
            memory: MemoryConfig::default(),
            reflection_timeout_ms: 30_000,
            step_timeout_ms: 30_000,
            session_budget_ms: None,
            direct_planning_confidence: 0.75,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain: explicit path, then
    /// `.agentdaemon.yml`, then user config dir, then defaults. Env
    /// overrides apply last.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?
        } else {
            let local = PathBuf::from(".agentdaemon.yml");
            let user = dirs::config_dir().map(|d| d.join("agentdaemon").join("agentdaemon.yml"));
            if local.exists() {
                Self::load_from_file(&local)?
            } else if let Some(user) = user.filter(|p| p.exists()) {
                Self::load_from_file(&user)?
            } else {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `AD_`-prefixed environment overrides
    pub fn apply_env_overrides(&mut self) {
        fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.parse().ok())
        }

        if let Some(v) = env_parse("AD_MAX_ITERATIONS") {
            self.max_iterations = v;
        }
        if let Some(v) = env_parse("AD_STUCK_THRESHOLD") {
            self.stuck_threshold = v;
        }
        if let Some(v) = env_parse("AD_RECOVERY_THRESHOLD") {
            self.recovery_threshold = v;
        }
        if let Some(v) = env_parse("AD_PLANNING_TIMEOUT_MS") {
            self.planning.timeout_ms = v;
        }
        if let Some(v) = env_parse("AD_PLANNING_FALLBACK_ENABLED") {
            self.planning.fallback_enabled = v;
        }
        if let Some(v) = env_parse("AD_PLANNING_CACHE_ENABLED") {
            self.planning.cache_enabled = v;
        }
        if let Some(v) = env_parse("AD_PLANNING_CACHE_TTL_SECS") {
            self.planning.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("AD_FEEDBACK_MAX_ENTRIES") {
            self.feedback.max_entries = v;
        }
        if let Some(v) = env_parse("AD_FEEDBACK_REQUIRE_RATING") {
            self.feedback.require_rating = v;
        }
        if let Some(v) = env_parse("AD_AUTO_APPROVE_ENABLED") {
            self.taskgen.auto_approve_enabled = v;
        }
        if let Some(v) = env_parse("AD_AUTO_APPROVE_MIN_CONFIDENCE") {
            self.taskgen.auto_approve_min_confidence = v;
        }
        if let Ok(v) = std::env::var("AD_TRUSTED_ANALYZERS") {
            self.taskgen.trusted_analyzers = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Some(v) = env_parse("AD_EMBEDDING_DIM") {
            self.memory.embedding_dim = v;
        }
        if let Some(v) = env_parse("AD_REEMBED_INTERVAL") {
            self.memory.reembed_interval = v;
        }
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            bail!("max-iterations must be at least 1");
        }
        if self.stuck_threshold == 0 {
            bail!("stuck-threshold must be at least 1");
        }
        for (name, value) in [
            ("checkpoints.plan", self.checkpoints.plan),
            ("checkpoints.strategy", self.checkpoints.strategy),
            ("checkpoints.parameter", self.checkpoints.parameter),
            ("checkpoints.execution", self.checkpoints.execution),
            ("recovery-threshold", self.recovery_threshold),
            ("direct-planning-confidence", self.direct_planning_confidence),
            ("taskgen.auto-approve-min-confidence", self.taskgen.auto_approve_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if self.memory.embedding_dim == 0 {
            bail!("memory.embedding-dim must be at least 1");
        }
        Ok(())
    }

    /// Checkpoint threshold for a decision type
    pub fn checkpoint_threshold(&self, decision_type: DecisionType) -> f32 {
        match decision_type {
            DecisionType::Plan => self.checkpoints.plan,
            DecisionType::Strategy => self.checkpoints.strategy,
            DecisionType::Parameter => self.checkpoints.parameter,
            DecisionType::Execution => self.checkpoints.execution,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 120_000,
        }
    }
}

/// Checkpoint confidence thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub plan: f32,
    pub strategy: f32,
    pub parameter: f32,
    pub execution: f32,
    /// Seconds to wait for a human before a checkpoint expires
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            plan: 0.70,
            strategy: 0.70,
            parameter: 0.75,
            execution: 0.90,
            timeout_secs: 300,
        }
    }
}

/// Planning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Soft planning budget in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Heuristic fallback when the LLM fails or times out
    #[serde(rename = "fallback-enabled")]
    pub fallback_enabled: bool,

    /// Success-gated plan caching
    #[serde(rename = "cache-enabled")]
    pub cache_enabled: bool,

    /// Cache entry TTL in seconds
    #[serde(rename = "cache-ttl-secs")]
    pub cache_ttl_secs: u64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            fallback_enabled: true,
            cache_enabled: true,
            cache_ttl_secs: 604_800,
        }
    }
}

/// Feedback storage knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Retained entry bound
    #[serde(rename = "max-entries")]
    pub max_entries: usize,

    /// Whether a rating is required on feedback
    #[serde(rename = "require-rating")]
    pub require_rating: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            max_entries: 5000,
            require_rating: false,
        }
    }
}

/// Task generation knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskGenConfig {
    #[serde(rename = "auto-approve-enabled")]
    pub auto_approve_enabled: bool,

    #[serde(rename = "auto-approve-min-confidence")]
    pub auto_approve_min_confidence: f32,

    #[serde(rename = "trusted-analyzers")]
    pub trusted_analyzers: Vec<String>,

    #[serde(rename = "batch-max")]
    pub batch_max: usize,
}

impl Default for TaskGenConfig {
    fn default() -> Self {
        Self {
            auto_approve_enabled: false,
            auto_approve_min_confidence: 0.9,
            trusted_analyzers: Vec::new(),
            batch_max: 50,
        }
    }
}

/// Memory substrate knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memory root directory; defaults under the workspace
    #[serde(rename = "dir")]
    pub dir: Option<PathBuf>,

    /// Embedding dimension
    #[serde(rename = "embedding-dim")]
    pub embedding_dim: usize,

    /// Writes between re-embedding passes
    #[serde(rename = "reembed-interval")]
    pub reembed_interval: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            embedding_dim: 384,
            reembed_interval: 10,
        }
    }
}
