//! Durable intent log (spec.md §4.8 crash safety).
//!
//! Each scheduled re-ingestion is recorded as a `pending` line before work
//! starts and a matching `done` line after the graph/vector write finishes.
//! On restart, [`IntentLog::pending`] replays whatever never got marked
//! complete. Append-only JSONL, one file per project, in the same spirit as
//! [`crate::audit::AuditLog`].

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{EssError, EssResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IntentStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IntentRecord {
    id: u64,
    path: String,
    status: IntentStatus,
    timestamp: String,
}

/// Append-only log of scheduled re-ingestions for one project.
pub struct IntentLog {
    path: PathBuf,
    next_id: AtomicU64,
}

impl IntentLog {
    /// Open (or create) the intent log under `data_dir`.
    pub fn open(data_dir: &Path) -> EssResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("intent.jsonl");
        let next_id = Self::max_id(&path)?.wrapping_add(1);
        Ok(Self {
            path,
            next_id: AtomicU64::new(next_id),
        })
    }

    /// Record a scheduled re-ingestion before work starts. The returned id
    /// must be passed to [`IntentLog::complete`] once the write finishes.
    pub fn schedule(&self, path: &str) -> EssResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.append(&IntentRecord {
            id,
            path: path.to_string(),
            status: IntentStatus::Pending,
            timestamp: now_iso8601(),
        })?;
        Ok(id)
    }

    /// Mark a scheduled re-ingestion complete.
    pub fn complete(&self, id: u64, path: &str) -> EssResult<()> {
        self.append(&IntentRecord {
            id,
            path: path.to_string(),
            status: IntentStatus::Done,
            timestamp: now_iso8601(),
        })
    }

    /// Paths whose most recent record is still `pending`, in the order they
    /// were originally scheduled. Replayed by the watcher at startup.
    pub fn pending(&self) -> EssResult<Vec<String>> {
        let mut latest: BTreeMap<u64, IntentRecord> = BTreeMap::new();
        if self.path.exists() {
            let file = std::fs::File::open(&self.path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(record) = serde_json::from_str::<IntentRecord>(&line) {
                    latest.insert(record.id, record);
                }
            }
        }
        Ok(latest
            .into_values()
            .filter(|r| r.status == IntentStatus::Pending)
            .map(|r| r.path)
            .collect())
    }

    fn append(&self, record: &IntentRecord) -> EssResult<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut line = serde_json::to_string(record).map_err(|e| EssError::Serialization(e.to_string()))?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn max_id(path: &Path) -> EssResult<u64> {
        if !path.exists() {
            return Ok(0);
        }
        let file = std::fs::File::open(path)?;
        let mut max = 0u64;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if let Ok(record) = serde_json::from_str::<IntentRecord>(&line) {
                max = max.max(record.id);
            }
        }
        Ok(max)
    }
}

fn now_iso8601() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_without_complete_is_replayed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = IntentLog::open(dir.path()).expect("open");
        log.schedule("src/lib.rs").expect("schedule");

        let pending = log.pending().expect("pending");
        assert_eq!(pending, vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn test_completed_entry_is_not_replayed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = IntentLog::open(dir.path()).expect("open");
        let id = log.schedule("src/lib.rs").expect("schedule");
        log.complete(id, "src/lib.rs").expect("complete");

        assert!(log.pending().expect("pending").is_empty());
    }

    #[test]
    fn test_ids_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let log = IntentLog::open(dir.path()).expect("open");
            let id = log.schedule("a.rs").expect("schedule");
            assert_eq!(id, 1);
        }
        let log = IntentLog::open(dir.path()).expect("reopen");
        let id = log.schedule("b.rs").expect("schedule");
        assert_eq!(id, 2);
    }

    #[test]
    fn test_mixed_pending_and_done_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = IntentLog::open(dir.path()).expect("open");
        let id_a = log.schedule("a.rs").expect("schedule a");
        let _id_b = log.schedule("b.rs").expect("schedule b");
        log.complete(id_a, "a.rs").expect("complete a");

        assert_eq!(log.pending().expect("pending"), vec!["b.rs".to_string()]);
    }
}
