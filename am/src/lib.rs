//! AgentMemory - append-only memory substrate for autonomous agent sessions
//!
//! Everything a session learns outlives it as newline-delimited records
//! under one workspace directory:
//!
//! - [`session`] - one record per terminal session, with aggregate stats
//! - [`episodic`] - searchable episodes with TF-IDF embeddings
//! - [`patterns`] - recovery outcomes aggregated by (category, strategy)
//! - [`preference`] - user decisions distilled into a profile
//! - [`feedback`] - bounded feedback, calibration, and checkpoint trails
//!
//! Writes are append-only and atomic per record; readers tolerate a torn
//! final record. A [`MemoryStores`] bundle opens all stores under one
//! root and is shared by every scheduler in the process.

pub mod embedder;
pub mod episodic;
pub mod feedback;
pub mod patterns;
pub mod preference;
pub mod session;
pub mod store;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

pub use embedder::{DEFAULT_EMBEDDING_DIM, TfIdfEmbedder, cosine_similarity};
pub use episodic::{
    DEFAULT_REEMBED_INTERVAL, Episode, EpisodeDraft, EpisodicStore, ScoredEpisode, SearchOptions,
};
pub use feedback::{
    CalibrationRecord, CalibrationStore, CheckpointRecord, CheckpointStore, DEFAULT_FEEDBACK_MAX_ENTRIES,
    FeedbackCategory, FeedbackRecord, FeedbackStore,
};
pub use patterns::{PatternRecord, PatternStore, RecoveryOutcome};
pub use preference::{
    DecisionRecord, DecisionSpeed, PreferencePattern, PreferenceStore, RiskTolerance, UserProfile, infer_profile,
};
pub use session::{RecoveryCounts, SessionLog, SessionMemoryRecord, SessionStats};
pub use store::{JsonlStore, StoreError};

/// All memory stores for one workspace, opened together
///
/// One bundle per workspace root; schedulers share it by reference. Each
/// store serializes its own writes, so the bundle itself needs no lock.
pub struct MemoryStores {
    root: PathBuf,
    pub sessions: SessionLog,
    pub episodes: EpisodicStore,
    pub patterns: PatternStore,
    pub preferences: PreferenceStore,
    pub feedback: FeedbackStore,
    pub calibration: CalibrationStore,
    pub checkpoints: CheckpointStore,
}

impl MemoryStores {
    /// Open every store under the given root directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(root, DEFAULT_EMBEDDING_DIM, DEFAULT_REEMBED_INTERVAL, DEFAULT_FEEDBACK_MAX_ENTRIES)
    }

    /// Open with explicit embedding dimension, re-embed interval, and feedback bound
    pub fn open_with(
        root: impl AsRef<Path>,
        embedding_dim: usize,
        reembed_interval: usize,
        feedback_max_entries: usize,
    ) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        debug!(root = %root.display(), embedding_dim, reembed_interval, "MemoryStores::open_with: called");
        std::fs::create_dir_all(&root)?;

        let stores = Self {
            sessions: SessionLog::open(&root)?,
            episodes: EpisodicStore::open(&root, embedding_dim, reembed_interval)?,
            patterns: PatternStore::open(&root)?,
            preferences: PreferenceStore::open(&root)?,
            feedback: FeedbackStore::open(&root, feedback_max_entries)?,
            calibration: CalibrationStore::open(&root)?,
            checkpoints: CheckpointStore::open(&root)?,
            root,
        };
        info!(root = %stores.root.display(), "MemoryStores: opened");
        Ok(stores)
    }

    /// Workspace memory root
    pub fn root(&self) -> &Path {
        &self.root
    }
}
