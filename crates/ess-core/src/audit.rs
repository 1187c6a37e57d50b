//! Query audit log.
//!
//! Every `/query` call appends one JSON object to
//! `<data_dir>/audit/<YYYYMM>.jsonl` so queries and their veracity scores
//! can be reconstructed after the fact without re-running anything. Append
//! -only, one file per calendar month, never read back by the running
//! process (a separate concern from the hash cache and intent log).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::EssResult;
use crate::types::QueryResponse;

/// One line of the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Caller-supplied request identifier (UUID).
    pub request_id: String,
    /// SHA-256 hex of the serialized evidence packet.
    pub packet_hash: String,
    /// Veracity score at the time the packet was returned.
    pub confidence_score: u8,
    /// ISO-8601 timestamp of the write.
    pub timestamp: String,
}

/// Appends [`AuditRecord`]s under `state_dir/audit/`.
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Create a logger rooted at `state_dir` (typically `Config::data_dir()`).
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("audit"),
        }
    }

    /// Record one query's outcome. Never fails the query itself on error;
    /// callers should log a warning on `Err` rather than abort.
    pub fn record(&self, request_id: &str, packet: &QueryResponse) -> EssResult<()> {
        let timestamp = now_iso8601();
        let record = AuditRecord {
            request_id: request_id.to_string(),
            packet_hash: hash_packet(packet),
            confidence_score: packet.veracity.score,
            timestamp: timestamp.clone(),
        };
        self.append(&record, &timestamp)
    }

    fn append(&self, record: &AuditRecord, timestamp: &str) -> EssResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let file_path = self.dir.join(format!("{}.jsonl", year_month(timestamp)));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        let mut line = serde_json::to_string(record)
            .map_err(|e| crate::error::EssError::Serialization(e.to_string()))?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

fn hash_packet(packet: &QueryResponse) -> String {
    let bytes = serde_json::to_vec(packet).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

fn now_iso8601() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Extract `YYYYMM` from an RFC3339 timestamp string (`"2026-07-28T..."`).
fn year_month(timestamp: &str) -> String {
    let digits: String = timestamp
        .chars()
        .take(7)
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.len() == 6 {
        digits
    } else {
        timestamp.chars().take(4).collect::<String>() + "01"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QueryResults, ResponseMeta, ResponseStatus, ResultSize, VeracityReport};

    fn packet() -> QueryResponse {
        QueryResponse {
            schema_version: "1.0".into(),
            request_id: "test-request".into(),
            status: ResponseStatus::Success,
            timestamp: "2024-01-01T00:00:00Z".into(),
            query_type: "code".into(),
            results: QueryResults::default(),
            warnings: None,
            fallback_message: None,
            meta: ResponseMeta {
                graph_queried: true,
                vector_queried: true,
                graph_latency_ms: 5,
                vector_latency_ms: 5,
                total_latency_ms: 10,
                cache_hit: false,
                result_size: ResultSize::default(),
                confidence: 0.9,
                ambiguous: false,
            },
            veracity: VeracityReport { score: 95, faults: Vec::new() },
        }
    }

    #[test]
    fn test_record_appends_jsonl_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::new(dir.path());
        log.record("req-1", &packet()).expect("record");

        let audit_dir = dir.path().join("audit");
        let entries: Vec<_> = std::fs::read_dir(&audit_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let content = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("\"request_id\":\"req-1\""));
        assert!(content.contains("\"confidence_score\":95"));
    }

    #[test]
    fn test_multiple_records_append_to_same_month_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::new(dir.path());
        log.record("req-1", &packet()).expect("record 1");
        log.record("req-2", &packet()).expect("record 2");

        let audit_dir = dir.path().join("audit");
        let entries: Vec<_> = std::fs::read_dir(&audit_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let content = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_year_month_extraction() {
        assert_eq!(year_month("2026-07-28T10:00:00Z"), "202607");
    }
}
