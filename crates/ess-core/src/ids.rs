//! Content-deterministic identifier derivation and project slug validation.
//!
//! Every node/edge/chunk identifier in the system is a truncated SHA-256
//! digest of a small set of inputs. Recomputing the digest from the same
//! inputs always yields the same id (I2/I3), which is what lets a
//! re-ingestion of unchanged content reuse existing ids instead of
//! generating new ones.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{EssError, EssResult};

/// Lowercase slug regex for project identifiers: `[a-z0-9._-]{1,64}`.
fn is_valid_project_slug(s: &str) -> bool {
    if s.is_empty() || s.len() > 64 {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
}

/// A validated, immutable project (tenant) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Validate and wrap a project slug.
    pub fn new(slug: impl Into<String>) -> EssResult<Self> {
        let slug = slug.into();
        if !is_valid_project_slug(&slug) {
            return Err(EssError::Validation {
                message: format!(
                    "invalid project slug {slug:?}: must match [a-z0-9._-]{{1,64}}"
                ),
            });
        }
        Ok(Self(slug))
    }

    /// Borrow the slug as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// First 16 hex characters (8 bytes) of a SHA-256 digest over `parts` joined by `:`.
fn digest16(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join(":").as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// `uid = SHA256(project || ':' || path || ':' || qualified_name)[:16]`.
///
/// Used for File, Code entity, and Document nodes alike; `qualified_name`
/// is the empty string for File/Document nodes (their identity is the path).
pub fn node_uid(project: &str, path: &str, qualified_name: &str) -> String {
    digest16(&[project, path, qualified_name])
}

/// `chunk_id = SHA256(project || ':' || path || ':' || chunk_index || ':' || content_hash)[:16]`.
pub fn chunk_id(project: &str, path: &str, chunk_index: usize, content_hash: &str) -> String {
    digest16(&[project, path, &chunk_index.to_string(), content_hash])
}

/// SHA-1 of raw file bytes (`prov_file_hash`).
pub fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of normalized text content (`prov_text_hash`, `content_hash`).
///
/// Normalization is CRLF -> LF only (I5); no trailing-whitespace changes.
pub fn text_hash(normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize line endings (CRLF -> LF). Applied before any content hashing.
pub fn normalize_text(raw: &str) -> String {
    if raw.contains('\r') {
        raw.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_slug_accepts_valid() {
        assert!(ProjectId::new("my-project_1.0").is_ok());
    }

    #[test]
    fn project_slug_rejects_uppercase_and_empty() {
        assert!(ProjectId::new("MyProject").is_err());
        assert!(ProjectId::new("").is_err());
        assert!(ProjectId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn node_uid_is_deterministic() {
        let a = node_uid("proj", "src/main.py", "main");
        let b = node_uid("proj", "src/main.py", "main");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn node_uid_differs_by_project() {
        let a = node_uid("proj-a", "src/main.py", "main");
        let b = node_uid("proj-b", "src/main.py", "main");
        assert_ne!(a, b);
    }

    #[test]
    fn chunk_id_stable_for_identical_inputs() {
        let a = chunk_id("proj", "a.py", 0, "deadbeef");
        let b = chunk_id("proj", "a.py", 0, "deadbeef");
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_text_handles_crlf_and_bare_cr() {
        assert_eq!(normalize_text("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn text_hash_is_normalization_invariant() {
        let unix = normalize_text("line one\nline two\n");
        let windows = normalize_text("line one\r\nline two\r\n");
        assert_eq!(text_hash(&unix), text_hash(&windows));
    }

    #[test]
    fn file_hash_matches_known_sha1_of_empty_input() {
        // SHA-1("") = da39a3ee5e6b4b0d3255bfef95601890afd80709
        assert_eq!(file_hash(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }
}
