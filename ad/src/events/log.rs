//! ContextLog - the single append-only event stream
//!
//! One JSONL file per session under the workspace events directory.
//! Emission never fails the caller: a write error is logged and the
//! record is dropped, because the event stream is observability, not
//! state.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use super::types::{Actor, ContextEvent, ContextRecord};

/// Append-only event log for one session
pub struct ContextLog {
    /// Session the log belongs to
    session_id: String,

    /// Log file path
    path: PathBuf,

    /// Open writer, created lazily on first emit
    writer: Mutex<Option<BufWriter<File>>>,
}

impl ContextLog {
    /// Create a log for a session under the given events directory
    pub fn new(events_dir: impl AsRef<Path>, session_id: impl Into<String>) -> std::io::Result<Self> {
        let session_id = session_id.into();
        let events_dir = events_dir.as_ref();
        debug!(%session_id, dir = %events_dir.display(), "ContextLog::new: called");
        fs::create_dir_all(events_dir)?;
        Ok(Self {
            path: events_dir.join(format!("{}.jsonl", session_id)),
            session_id,
            writer: Mutex::new(None),
        })
    }

    /// Session this log belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Emit one event from the autonomous actor
    pub fn emit(&self, event: ContextEvent) {
        self.emit_as(Actor::Autonomous, event);
    }

    /// Emit one event with an explicit actor
    pub fn emit_as(&self, actor: Actor, event: ContextEvent) {
        debug!(session_id = %self.session_id, act = event.act(), "ContextLog::emit_as: called");
        let record = ContextRecord::new(actor, event);
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "ContextLog: failed to serialize event");
                return;
            }
        };

        let mut guard = self.writer.lock().expect("context log lock poisoned");
        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(BufWriter::new(file)),
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "ContextLog: failed to open log file");
                    return;
                }
            }
        }

        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writeln!(writer, "{}", json).and_then(|_| writer.flush()) {
                warn!(session_id = %self.session_id, error = %e, "ContextLog: failed to write event");
            }
        }
    }
}

/// Read a session's event records from the events directory
///
/// Unparseable lines (torn final record, manual edits) are skipped with
/// a warning.
pub fn read_session_events(events_dir: impl AsRef<Path>, session_id: &str) -> std::io::Result<Vec<ContextRecord>> {
    let path = events_dir.as_ref().join(format!("{}.jsonl", session_id));
    debug!(path = %path.display(), "read_session_events: called");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path)?;
    let mut records = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ContextRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(lineno, error = %e, "read_session_events: skipping unparseable line");
            }
        }
    }

    debug!(count = records.len(), "read_session_events: loaded records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_emit_and_read_back() {
        let temp = tempdir().unwrap();
        let log = ContextLog::new(temp.path(), "sess-1").unwrap();

        log.emit(ContextEvent::IterationBegin {
            session_id: "sess-1".to_string(),
            iteration: 1,
        });
        log.emit_as(
            Actor::User,
            ContextEvent::CheckpointResolved {
                session_id: "sess-1".to_string(),
                checkpoint_id: "cp-1".to_string(),
                selected_option_id: "opt-1".to_string(),
                modified: false,
            },
        );

        let records = read_session_events(temp.path(), "sess-1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event.act(), "iteration_begin");
        assert_eq!(records[1].actor, Actor::User);
    }

    #[test]
    fn test_read_missing_session_is_empty() {
        let temp = tempdir().unwrap();
        let records = read_session_events(temp.path(), "nope").unwrap();
        assert!(records.is_empty());
    }
}
