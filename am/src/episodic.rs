//! Episodic memory - searchable records of finished sessions
//!
//! Each terminal session writes one episode: what the task was, how it
//! went, which tools carried it. Episodes are embedded at write time with
//! the vocabulary in force at that moment; queries embed with the latest
//! vocabulary, and the store re-embeds everything once enough new
//! vocabulary accumulates so stored vectors and queries stay comparable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embedder::{TfIdfEmbedder, cosine_similarity};
use crate::store::{JsonlStore, StoreError};

/// Default number of writes between re-embedding passes
pub const DEFAULT_REEMBED_INTERVAL: usize = 10;

/// Persistent record of a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique episode id (time-ordered)
    pub id: String,

    /// The original task text
    pub task: String,

    /// Classified task type (code_generation, debugging, ...)
    pub task_type: String,

    /// Whether the session reached a successful terminal outcome
    pub success: bool,

    /// Iterations the session consumed
    pub iterations: u32,

    /// Tools used across the session
    pub tools_used: Vec<String>,

    /// Strategy label (e.g. the chosen alternative's name)
    pub strategy: String,

    /// One-paragraph summary of what happened
    pub summary: String,

    /// Final confidence the session reported
    pub confidence: f32,

    /// Failure reason for unsuccessful sessions
    pub failure_reason: Option<String>,

    /// Number of classified errors encountered
    pub error_count: u32,

    /// Embedding of the task text under `vocab_version`
    pub embedding: Vec<f32>,

    /// Embedder version the embedding was computed with
    pub vocab_version: u64,

    /// When the episode was written
    pub timestamp: DateTime<Utc>,
}

/// Episode fields supplied by the caller; id/embedding/timestamp are filled in
#[derive(Debug, Clone)]
pub struct EpisodeDraft {
    pub task: String,
    pub task_type: String,
    pub success: bool,
    pub iterations: u32,
    pub tools_used: Vec<String>,
    pub strategy: String,
    pub summary: String,
    pub confidence: f32,
    pub failure_reason: Option<String>,
    pub error_count: u32,
}

/// Search parameters
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum results (capped at 20)
    pub top_n: usize,
    /// Minimum cosine similarity
    pub min_score: f32,
    /// Restrict to one task type
    pub task_type: Option<String>,
    /// Restrict to successes or failures
    pub success: Option<bool>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_n: 5,
            min_score: 0.3,
            task_type: None,
            success: None,
        }
    }
}

/// Hard cap on search result count
const MAX_TOP_N: usize = 20;

/// An episode with its similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredEpisode {
    pub episode: Episode,
    pub score: f32,
}

struct EpisodicInner {
    episodes: Vec<Episode>,
    embedder: TfIdfEmbedder,
    writes_since_reembed: usize,
}

/// Episodic store: write (append + index) and search
pub struct EpisodicStore {
    store: JsonlStore,
    vocab_path: PathBuf,
    inner: Mutex<EpisodicInner>,
    reembed_interval: usize,
    /// Bumped on every write; a re-embed pass restarts if it moved
    generation: AtomicU64,
    /// Single-flight guard for re-embedding
    reembed_running: AtomicBool,
}

impl EpisodicStore {
    /// Open the episodic store under the given directory
    pub fn open(dir: impl AsRef<Path>, dim: usize, reembed_interval: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        debug!(dir = %dir.display(), dim, reembed_interval, "EpisodicStore::open: called");
        let store = JsonlStore::open(dir.join("episodic_memory.jsonl"))?;
        let vocab_path = dir.join("episodic_vocab.json");

        let embedder = match std::fs::read_to_string(&vocab_path) {
            Ok(content) => match serde_json::from_str::<TfIdfEmbedder>(&content) {
                Ok(embedder) if embedder.dim() == dim => embedder,
                Ok(embedder) => {
                    warn!(
                        stored_dim = embedder.dim(),
                        dim, "EpisodicStore::open: dimension changed, starting fresh vocabulary"
                    );
                    TfIdfEmbedder::new(dim)
                }
                Err(e) => {
                    warn!(error = %e, "EpisodicStore::open: unreadable vocabulary, starting fresh");
                    TfIdfEmbedder::new(dim)
                }
            },
            Err(_) => TfIdfEmbedder::new(dim),
        };

        let episodes: Vec<Episode> = store.read_all()?;
        info!(count = episodes.len(), vocab = embedder.vocabulary_len(), "EpisodicStore::open: loaded");

        Ok(Self {
            store,
            vocab_path,
            inner: Mutex::new(EpisodicInner {
                episodes,
                embedder,
                writes_since_reembed: 0,
            }),
            reembed_interval: reembed_interval.max(1),
            generation: AtomicU64::new(0),
            reembed_running: AtomicBool::new(false),
        })
    }

    /// Write one episode: grow vocabulary, embed, append, index
    pub fn write(&self, draft: EpisodeDraft) -> Result<Episode, StoreError> {
        debug!(task_type = %draft.task_type, success = draft.success, "EpisodicStore::write: called");
        let mut inner = self.inner.lock().expect("episodic lock poisoned");

        inner.embedder.observe(&draft.task);
        let embedding = inner.embedder.embed(&draft.task);
        let vocab_version = inner.embedder.version();

        let episode = Episode {
            id: Uuid::now_v7().to_string(),
            task: draft.task,
            task_type: draft.task_type,
            success: draft.success,
            iterations: draft.iterations,
            tools_used: draft.tools_used,
            strategy: draft.strategy,
            summary: draft.summary,
            confidence: draft.confidence,
            failure_reason: draft.failure_reason,
            error_count: draft.error_count,
            embedding,
            vocab_version,
            timestamp: Utc::now(),
        };

        self.store.append(&episode)?;
        self.persist_vocab(&inner.embedder);
        inner.episodes.push(episode.clone());
        inner.writes_since_reembed += 1;
        self.generation.fetch_add(1, Ordering::SeqCst);

        debug!(id = %episode.id, total = inner.episodes.len(), "EpisodicStore::write: appended");
        Ok(episode)
    }

    /// Search by cosine similarity over the current vocabulary
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<ScoredEpisode> {
        debug!(query_len = query.len(), top_n = options.top_n, "EpisodicStore::search: called");
        let inner = self.inner.lock().expect("episodic lock poisoned");
        let query_vec = inner.embedder.embed(query);

        let mut scored: Vec<ScoredEpisode> = inner
            .episodes
            .iter()
            .filter(|e| {
                options.task_type.as_deref().is_none_or(|t| e.task_type == t)
                    && options.success.is_none_or(|s| e.success == s)
            })
            .map(|e| ScoredEpisode {
                score: cosine_similarity(&query_vec, &e.embedding),
                episode: e.clone(),
            })
            .filter(|s| s.score >= options.min_score)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.top_n.min(MAX_TOP_N));
        debug!(results = scored.len(), "EpisodicStore::search: done");
        scored
    }

    /// Total episodes held
    pub fn len(&self) -> usize {
        self.inner.lock().expect("episodic lock poisoned").episodes.len()
    }

    /// Whether the store holds no episodes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterations statistics for a task type, from past episodes
    ///
    /// Returns (min, average, max) iterations over matching episodes.
    pub fn iteration_stats(&self, task_type: &str) -> Option<(u32, f32, u32)> {
        let inner = self.inner.lock().expect("episodic lock poisoned");
        let matching: Vec<u32> = inner
            .episodes
            .iter()
            .filter(|e| e.task_type == task_type)
            .map(|e| e.iterations)
            .collect();
        if matching.is_empty() {
            return None;
        }
        let min = *matching.iter().min().unwrap();
        let max = *matching.iter().max().unwrap();
        let avg = matching.iter().sum::<u32>() as f32 / matching.len() as f32;
        Some((min, avg, max))
    }

    /// Whether enough writes landed to warrant a re-embedding pass
    pub fn needs_reembed(&self) -> bool {
        let inner = self.inner.lock().expect("episodic lock poisoned");
        inner.writes_since_reembed >= self.reembed_interval
    }

    /// Re-embed all stored episodes under the current vocabulary
    ///
    /// Single-flight: a second concurrent call returns immediately. The
    /// pass snapshots the store, computes embeddings outside the lock,
    /// and restarts if any write landed meanwhile.
    pub fn reembed(&self) -> Result<bool, StoreError> {
        if self
            .reembed_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("EpisodicStore::reembed: already running, skipping");
            return Ok(false);
        }

        let result = self.reembed_inner();
        self.reembed_running.store(false, Ordering::SeqCst);
        result.map(|_| true)
    }

    fn reembed_inner(&self) -> Result<(), StoreError> {
        loop {
            let start_gen = self.generation.load(Ordering::SeqCst);
            let (snapshot, embedder) = {
                let inner = self.inner.lock().expect("episodic lock poisoned");
                (inner.episodes.clone(), inner.embedder.clone())
            };

            debug!(count = snapshot.len(), version = embedder.version(), "EpisodicStore::reembed: pass start");
            let version = embedder.version();
            let rebuilt: Vec<Episode> = snapshot
                .into_iter()
                .map(|mut e| {
                    e.embedding = embedder.embed(&e.task);
                    e.vocab_version = version;
                    e
                })
                .collect();

            let mut inner = self.inner.lock().expect("episodic lock poisoned");
            if self.generation.load(Ordering::SeqCst) != start_gen {
                // A write landed during the pass; its vector would be lost.
                debug!("EpisodicStore::reembed: preempted by write, restarting");
                drop(inner);
                continue;
            }

            self.store.rewrite(&rebuilt)?;
            inner.episodes = rebuilt;
            inner.writes_since_reembed = 0;
            info!(version, count = inner.episodes.len(), "EpisodicStore::reembed: complete");
            return Ok(());
        }
    }

    fn persist_vocab(&self, embedder: &TfIdfEmbedder) {
        match serde_json::to_string(embedder) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.vocab_path, json) {
                    warn!(error = %e, "EpisodicStore: failed to persist vocabulary");
                }
            }
            Err(e) => warn!(error = %e, "EpisodicStore: failed to serialize vocabulary"),
        }
    }
}
