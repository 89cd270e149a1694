//! TF-IDF text embedder
//!
//! Embeds task text into fixed-dimension vectors without an external
//! model. Terms hash into one of `dim` buckets; weights are tf * idf,
//! L2-normalized. The vocabulary (document frequencies) grows
//! incrementally as episodes are observed, so idf weights drift and
//! stored vectors must be re-embedded once enough new material lands -
//! the store tracks the embedder's version for that.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Incremental TF-IDF embedder with a fixed output dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfEmbedder {
    /// Output vector dimension
    dim: usize,

    /// Number of documents observed
    doc_count: u64,

    /// Per-term document frequency
    doc_freq: HashMap<String, u64>,

    /// Bumped whenever observing a document introduced new terms
    version: u64,
}

impl TfIdfEmbedder {
    /// Create an embedder with the given output dimension
    pub fn new(dim: usize) -> Self {
        debug!(dim, "TfIdfEmbedder::new: called");
        Self {
            dim,
            doc_count: 0,
            doc_freq: HashMap::new(),
            version: 0,
        }
    }

    /// Output dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Current vocabulary version
    ///
    /// Bumped only when observation introduced previously unseen terms;
    /// vectors embedded under different versions are not comparable.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of distinct terms observed
    pub fn vocabulary_len(&self) -> usize {
        self.doc_freq.len()
    }

    /// Observe a document, growing the vocabulary
    ///
    /// Returns the number of previously unseen terms.
    pub fn observe(&mut self, text: &str) -> usize {
        debug!(text_len = text.len(), "TfIdfEmbedder::observe: called");
        let terms: HashSet<String> = tokenize(text).into_iter().collect();
        let mut new_terms = 0;
        for term in terms {
            let entry = self.doc_freq.entry(term).or_insert_with(|| {
                new_terms += 1;
                0
            });
            *entry += 1;
        }
        self.doc_count += 1;
        if new_terms > 0 {
            self.version += 1;
        }
        debug!(new_terms, doc_count = self.doc_count, version = self.version, "TfIdfEmbedder::observe: done");
        new_terms
    }

    /// Embed text into a normalized fixed-dimension vector
    pub fn embed(&self, text: &str) -> Vec<f32> {
        debug!(text_len = text.len(), "TfIdfEmbedder::embed: called");
        let tokens = tokenize(text);
        let mut tf: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let mut vector = vec![0.0f32; self.dim];
        let total = tokens.len().max(1) as f32;
        for (term, count) in tf {
            let df = self.doc_freq.get(term).copied().unwrap_or(0);
            let idf = ((1.0 + self.doc_count as f32) / (1.0 + df as f32)).ln() + 1.0;
            let weight = (count / total) * idf;
            let bucket = hash_term(term) as usize % self.dim;
            vector[bucket] += weight;
        }

        normalize(&mut vector);
        vector
    }
}

/// Lowercased alphanumeric tokens, length >= 2
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_string())
        .collect()
}

/// FNV-1a - deterministic across runs, unlike the std hasher
fn hash_term(term: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in term.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// L2-normalize in place; zero vectors stay zero
fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_dimension_is_fixed() {
        let mut embedder = TfIdfEmbedder::new(64);
        embedder.observe("clone the repository and read its readme");
        let v = embedder.embed("clone repository");
        assert_eq!(v.len(), 64);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let mut embedder = TfIdfEmbedder::new(DEFAULT_EMBEDDING_DIM);
        embedder.observe("install project dependencies with npm");
        embedder.observe("debug the failing test suite");

        let v = embedder.embed("install project dependencies with npm");
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6, "self similarity was {}", sim);
    }

    #[test]
    fn test_related_texts_score_higher_than_unrelated() {
        let mut embedder = TfIdfEmbedder::new(DEFAULT_EMBEDDING_DIM);
        embedder.observe("install dependencies with npm install");
        embedder.observe("refactor the sorting function for speed");
        embedder.observe("clone a git repository");

        let query = embedder.embed("npm install dependencies");
        let related = embedder.embed("install dependencies with npm install");
        let unrelated = embedder.embed("refactor the sorting function for speed");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_version_bumps_only_on_new_terms() {
        let mut embedder = TfIdfEmbedder::new(32);
        embedder.observe("alpha beta gamma");
        let v1 = embedder.version();

        // Same terms again: no version bump
        embedder.observe("alpha beta");
        assert_eq!(embedder.version(), v1);

        embedder.observe("delta epsilon");
        assert!(embedder.version() > v1);
    }

    #[test]
    fn test_cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_tokenize_drops_short_and_nonalnum() {
        let tokens = tokenize("a an The quick-brown fox! 42");
        assert!(tokens.contains(&"quick".to_string()));
        assert!(tokens.contains(&"brown".to_string()));
        assert!(tokens.contains(&"42".to_string()));
        assert!(!tokens.iter().any(|t| t == "a"));
    }
}
