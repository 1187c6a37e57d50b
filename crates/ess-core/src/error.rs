//! Error taxonomy for ess-core.
//!
//! The hierarchy mirrors the propagation-severity ordering: configuration
//! failures are fatal at startup, validation failures are returned to the
//! caller untouched, backend/timeout failures degrade a query to
//! `partial`/`unavailable`, integrity faults abort one write and continue
//! the batch, and embedding-missing is non-fatal and only ever flagged in
//! veracity scoring.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all ess-core operations.
#[derive(Debug, Error)]
pub enum EssError {
    /// Invalid configuration or a missing required secret. Fatal at startup;
    /// recovered only by operator action.
    #[error("configuration error: {message}")]
    Config {
        /// What's wrong with the configuration.
        message: String,
    },

    /// A malformed request: bad project slug, invalid tool arguments, a path
    /// traversal attempt. Returned to the caller with a precise message;
    /// never written to either store.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable description of the violated constraint.
        message: String,
    },

    /// A store or the embedder is unreachable, or its circuit is open.
    #[error("backend unavailable: {service}: {reason}")]
    BackendUnavailable {
        /// Which backend failed (`graph`, `vector`, `embedding`, `synthesis`).
        service: String,
        /// Why it's unavailable.
        reason: String,
    },

    /// A per-call deadline expired. Treated as `BackendUnavailable` for that call.
    #[error("timeout after {elapsed_ms}ms calling {service} (deadline {deadline_ms}ms)")]
    Timeout {
        /// Which backend timed out.
        service: String,
        /// Configured deadline in milliseconds.
        deadline_ms: u64,
        /// Actual elapsed time in milliseconds.
        elapsed_ms: u64,
    },

    /// A violation of a data invariant: cross-project edge attempted, unknown
    /// relationship type, composite-uniqueness conflict. The offending write
    /// is aborted and rolled back; ingestion continues with the next file.
    #[error("integrity fault: {message}")]
    Integrity {
        /// Description of the violated invariant.
        message: String,
    },

    /// A matched Code node lacks a current embedding. Non-fatal; flagged in
    /// veracity scoring rather than surfaced as a hard error.
    #[error("embedding missing for {uid}")]
    EmbeddingMissing {
        /// uid of the node whose embedding is missing.
        uid: String,
    },

    /// The circuit for a backend is open; calls fail immediately.
    #[error("circuit open for {service} (opened at {opened_at}, resets at {reset_at})")]
    CircuitOpen {
        /// Backend whose circuit is open.
        service: String,
        /// ISO-8601 timestamp the circuit opened.
        opened_at: String,
        /// ISO-8601 timestamp the circuit is eligible to half-open.
        reset_at: String,
    },

    /// A single file failed to parse. The rest of the index is unaffected.
    #[error("parse error for {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// Requested entity was not found.
    #[error("not found: {entity}")]
    NotFound {
        /// Description of what was not found.
        entity: String,
    },

    /// SQLite error, wrapped.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error, wrapped.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Any uncaught condition. Logged with a correlation id; never silently
    /// swallowed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EssError {
    /// True for error kinds the recovery policy retries with backoff before
    /// tripping a circuit (transient I/O and timeout failures).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::BackendUnavailable { .. } | Self::Io(_)
        )
    }

    /// Maps to the CLI exit codes in spec.md §6.
    pub fn cli_exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => 2,
            Self::NotFound { .. } => 3,
            Self::BackendUnavailable { .. } | Self::Timeout { .. } | Self::CircuitOpen { .. } => 4,
            Self::Integrity { .. } => 5,
            _ => 1,
        }
    }
}

/// Convenience type alias for Results in ess-core.
pub type EssResult<T> = Result<T, EssError>;
