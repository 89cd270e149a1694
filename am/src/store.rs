//! Core append-only record store
//!
//! One file per store, one JSON record per line. Appends take an advisory
//! file lock so concurrent sessions in the same process (or a sibling
//! process) never interleave partial lines. Readers tolerate a torn final
//! record: everything up to the last complete line is returned.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store write failed after {attempts} attempts: {message}")]
    WriteExhausted { attempts: u32, message: String },
}

/// Number of append attempts before a write is queued in memory
const WRITE_ATTEMPTS: u32 = 3;

/// Backoff schedule between append attempts
const WRITE_BACKOFF: [Duration; 2] = [Duration::from_millis(25), Duration::from_millis(100)];

/// Append-only newline-delimited JSON record file
///
/// Each store owns one file. Writes are serialized by an internal mutex
/// plus an advisory file lock, so a record is either fully present or
/// absent - readers never observe a half-written record as valid.
pub struct JsonlStore {
    /// Path to the backing file
    path: PathBuf,

    /// Records that failed to reach disk, flushed on the next success
    pending: Mutex<Vec<String>>,
}

impl JsonlStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "JsonlStore::open: called");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Path to the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, retrying transient failures
    ///
    /// After three failed attempts the record is queued in memory and the
    /// call reports the exhaustion; the queue drains on the next append
    /// that reaches disk.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), StoreError> {
        debug!(path = %self.path.display(), "JsonlStore::append: called");
        let line = serde_json::to_string(record)?;

        let mut last_err: Option<std::io::Error> = None;
        for attempt in 0..WRITE_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(WRITE_BACKOFF[(attempt - 1) as usize]);
            }
            match self.append_lines(&line) {
                Ok(()) => {
                    debug!(attempt, "JsonlStore::append: write reached disk");
                    return Ok(());
                }
                Err(e) => {
                    warn!(path = %self.path.display(), attempt, error = %e, "JsonlStore::append: attempt failed");
                    last_err = Some(e);
                }
            }
        }

        // Queue in memory; drained by the next successful append
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.push(line);
        let message = last_err.map(|e| e.to_string()).unwrap_or_default();
        warn!(path = %self.path.display(), queued = pending.len(), "JsonlStore::append: write exhausted, record queued");
        Err(StoreError::WriteExhausted {
            attempts: WRITE_ATTEMPTS,
            message,
        })
    }

    /// Write the pending queue plus one line under the file lock
    fn append_lines(&self, line: &str) -> Result<(), std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        let result = (|| {
            let mut writer = BufWriter::new(&file);
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            for queued in pending.iter() {
                writeln!(writer, "{}", queued)?;
            }
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            pending.clear();
            Ok(())
        })();
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    /// Read every complete record, skipping unparseable lines
    ///
    /// A torn final record (process died mid-write) parses as garbage and
    /// is dropped with a warning, matching the truncate-at-last-complete
    /// contract.
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        debug!(path = %self.path.display(), "JsonlStore::read_all: called");
        if !self.path.exists() {
            debug!("JsonlStore::read_all: no file yet, returning empty");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let mut records = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = %self.path.display(), lineno, error = %e, "JsonlStore::read_all: skipping unparseable line");
                }
            }
        }

        debug!(count = records.len(), "JsonlStore::read_all: loaded records");
        Ok(records)
    }

    /// Number of records queued in memory awaiting a successful write
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    /// Atomically replace the store contents with the given records
    ///
    /// Used by maintenance passes (re-embedding, bounded-store compaction).
    /// Writes a sibling temp file and renames it over the original so
    /// readers see either the old or the new contents.
    pub fn rewrite<T: Serialize>(&self, records: &[T]) -> Result<(), StoreError> {
        debug!(path = %self.path.display(), count = records.len(), "JsonlStore::rewrite: called");
        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            for record in records {
                let line = serde_json::to_string(record)?;
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!("JsonlStore::rewrite: rename complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec {
        id: u32,
        name: String,
    }

    #[test]
    fn test_append_and_read_roundtrip() {
        let temp = tempdir().unwrap();
        let store = JsonlStore::open(temp.path().join("recs.jsonl")).unwrap();

        store.append(&Rec { id: 1, name: "one".into() }).unwrap();
        store.append(&Rec { id: 2, name: "two".into() }).unwrap();

        let records: Vec<Rec> = store.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].name, "two");
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let store = JsonlStore::open(temp.path().join("never-written.jsonl")).unwrap();
        let records: Vec<Rec> = store.read_all().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_torn_final_record_is_dropped() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("recs.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        store.append(&Rec { id: 1, name: "ok".into() }).unwrap();

        // Simulate a crash mid-write: append half a record with no newline
        use std::io::Write as _;
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"id\":2,\"na").unwrap();

        let records: Vec<Rec> = store.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 1);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let temp = tempdir().unwrap();
        let store = JsonlStore::open(temp.path().join("recs.jsonl")).unwrap();
        store.append(&Rec { id: 1, name: "old".into() }).unwrap();

        store
            .rewrite(&[Rec { id: 9, name: "new".into() }, Rec { id: 10, name: "er".into() }])
            .unwrap();

        let records: Vec<Rec> = store.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 9);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn append_then_read_preserves_all_records(names in proptest::collection::vec("[a-z0-9 ]{0,40}", 0..30)) {
                let temp = tempdir().unwrap();
                let store = JsonlStore::open(temp.path().join("recs.jsonl")).unwrap();
                for (id, name) in names.iter().enumerate() {
                    store.append(&Rec { id: id as u32, name: name.clone() }).unwrap();
                }
                let records: Vec<Rec> = store.read_all().unwrap();
                prop_assert_eq!(records.len(), names.len());
                for (id, name) in names.iter().enumerate() {
                    prop_assert_eq!(&records[id].name, name);
                }
            }
        }
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("recs.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        store.append(&Rec { id: 1, name: "a".into() }).unwrap();

        use std::io::Write as _;
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json at all").unwrap();

        store.append(&Rec { id: 2, name: "b".into() }).unwrap();

        let records: Vec<Rec> = store.read_all().unwrap();
        assert_eq!(records.len(), 2);
    }
}
