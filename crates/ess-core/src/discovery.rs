//! File Discovery & Classifier (C1).
//!
//! Walks a project root, applies the ignore policy (fixed security
//! exclusions, `.gitignore`, generated-artifact patterns, and the caller's
//! `exclude_patterns`), classifies every surviving file, and computes the
//! provenance fields the rest of the pipeline needs. Pure with respect to
//! the store: this module only reads the filesystem.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::IndexingConfig;
use crate::error::EssResult;
use crate::ids;
use crate::types::{FileCategory, Language};

/// Files this large are never read into memory for hashing/classification
/// beyond a sniff of the first bytes; they are still discovered as Asset
/// nodes so the graph knows they exist.
const SNIFF_BYTES: usize = 8192;

/// Always excluded regardless of `.gitignore` or caller configuration.
/// These are security-sensitive filenames that must never be read, let
/// alone embedded and made retrievable.
const SECURITY_DENYLIST: &[&str] = &[
    ".env", ".env.*", "*.pem", "*.key", "*.p12", "*.keystore", "id_rsa", "id_ed25519",
];

/// One discovered, classified file, ready to feed the parser/chunker/embedder.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Path relative to the repository root, forward-slash separated.
    pub path: String,
    /// Absolute path on disk, for reading content.
    pub abs_path: PathBuf,
    /// Detected language/format.
    pub language: Language,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Line count after CRLF normalization (0 for binary files).
    pub line_count: u32,
    /// Code / Document / Config / Asset.
    pub category: FileCategory,
    /// Whether the content sniff found this file to be binary.
    pub is_binary: bool,
    /// SHA-1 of the raw file bytes.
    pub prov_file_hash: String,
    /// SHA-256 of the CRLF-normalized text, `None` for binary files.
    pub prov_text_hash: Option<String>,
    /// mtime truncated to whole seconds, UTC, ISO-8601.
    pub prov_last_modified: String,
}

/// A file that was skipped because it could not be read or its metadata
/// could not be queried. Reported in the ingestion summary rather than
/// silently dropped (spec.md §4.1).
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkippedFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Discovered files, in `sorted(path)` order.
    pub files: Vec<FileMetadata>,
    /// Files that were present but unreadable.
    pub skipped: Vec<SkippedFile>,
}

/// Walk `root` and return every non-ignored file, classified and hashed, in
/// deterministic path order.
pub fn discover(root: &Path, config: &IndexingConfig) -> EssResult<DiscoveryReport> {
    let ignore = build_ignore_set(root, config)?;

    let mut candidates: Vec<PathBuf> = Vec::new();
    walk(root, root, &ignore, config.follow_symlinks, &mut candidates)?;
    candidates.sort();

    let mut files = Vec::with_capacity(candidates.len());
    let mut skipped = Vec::new();

    for abs_path in candidates {
        let rel = relative_path(root, &abs_path);
        match classify_one(root, &abs_path, &rel, config) {
            Ok(meta) => files.push(meta),
            Err(e) => skipped.push(SkippedFile {
                path: rel,
                reason: e.to_string(),
            }),
        }
    }

    Ok(DiscoveryReport { files, skipped })
}

fn walk(
    root: &Path,
    dir: &Path,
    ignore: &GlobSet,
    follow_symlinks: bool,
    out: &mut Vec<PathBuf>,
) -> EssResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let rel = relative_path(root, &path);

        if is_ignored(&rel, ignore) {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if file_type.is_symlink() && !follow_symlinks {
            continue;
        }

        if file_type.is_dir() || (file_type.is_symlink() && path.is_dir()) {
            walk(root, &path, ignore, follow_symlinks, out)?;
        } else {
            out.push(path);
        }
    }

    Ok(())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_ignored(rel_path: &str, ignore: &GlobSet) -> bool {
    if rel_path.is_empty() {
        return false;
    }
    ignore.is_match(rel_path) || rel_path.split('/').any(|seg| seg == ".git")
}

/// Build the combined glob set: always-excluded security files, the caller's
/// `exclude_patterns`, and any `.gitignore` found at the project root.
fn build_ignore_set(root: &Path, config: &IndexingConfig) -> EssResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();

    for pattern in SECURITY_DENYLIST {
        add_pattern(&mut builder, pattern);
    }
    for pattern in &config.exclude_patterns {
        add_pattern(&mut builder, pattern);
    }

    if let Ok(contents) = std::fs::read_to_string(root.join(".gitignore")) {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            add_pattern(&mut builder, line.trim_start_matches('/'));
        }
    }

    builder
        .build()
        .map_err(|e| crate::error::EssError::Config {
            message: format!("invalid ignore pattern: {e}"),
        })
}

fn add_pattern(builder: &mut GlobSetBuilder, pattern: &str) {
    let candidates: HashSet<String> = if pattern.contains('/') {
        HashSet::from([pattern.to_string()])
    } else {
        HashSet::from([pattern.to_string(), format!("**/{pattern}")])
    };
    for candidate in candidates {
        if let Ok(glob) = Glob::new(&candidate) {
            builder.add(glob);
        }
    }
}

fn classify_one(
    root: &Path,
    abs_path: &Path,
    rel_path: &str,
    config: &IndexingConfig,
) -> EssResult<FileMetadata> {
    let metadata = std::fs::metadata(abs_path)?;
    let size_bytes = metadata.len();

    if size_bytes > config.max_file_size {
        return classify_oversized(abs_path, rel_path, size_bytes);
    }

    let bytes = std::fs::read(abs_path)?;
    let sniff_len = bytes.len().min(SNIFF_BYTES);
    let is_binary = sniff_is_binary(&bytes[..sniff_len]);

    let prov_file_hash = ids::file_hash(&bytes);
    let prov_last_modified = last_modified_iso(&metadata);

    if is_binary {
        return Ok(FileMetadata {
            path: rel_path.to_string(),
            abs_path: abs_path.to_path_buf(),
            language: Language::Unknown,
            size_bytes,
            line_count: 0,
            category: FileCategory::Asset,
            is_binary: true,
            prov_file_hash,
            prov_text_hash: None,
            prov_last_modified,
        });
    }

    let text = String::from_utf8(bytes)
        .map_err(|e| crate::error::EssError::Parse {
            path: abs_path.to_path_buf(),
            message: format!("invalid UTF-8: {e}"),
        })?;
    let normalized = ids::normalize_text(&text);
    let prov_text_hash = Some(ids::text_hash(&normalized));
    let line_count = u32::try_from(normalized.lines().count()).unwrap_or(u32::MAX);

    let ext = abs_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let language = Language::from_extension(&ext);
    let category = classify_category(language, &ext);

    let _ = root;
    Ok(FileMetadata {
        path: rel_path.to_string(),
        abs_path: abs_path.to_path_buf(),
        language,
        size_bytes,
        line_count,
        category,
        is_binary: false,
        prov_file_hash,
        prov_text_hash,
        prov_last_modified,
    })
}

/// Oversized files still get a File node (metadata only, no content read).
fn classify_oversized(abs_path: &Path, rel_path: &str, size_bytes: u64) -> EssResult<FileMetadata> {
    let metadata = std::fs::metadata(abs_path)?;
    let prov_last_modified = last_modified_iso(&metadata);
    Ok(FileMetadata {
        path: rel_path.to_string(),
        abs_path: abs_path.to_path_buf(),
        language: Language::Unknown,
        size_bytes,
        line_count: 0,
        category: FileCategory::Asset,
        is_binary: true,
        prov_file_hash: String::new(),
        prov_text_hash: None,
        prov_last_modified,
    })
}

fn classify_category(language: Language, ext: &str) -> FileCategory {
    if language.is_code() {
        FileCategory::Code
    } else if language.is_document() {
        FileCategory::Document
    } else {
        match ext {
            "toml" | "yml" | "yaml" | "json" | "jsonc" => FileCategory::Config,
            _ => FileCategory::Asset,
        }
    }
}

/// First 8KiB contains a null byte, or fails to decode as UTF-8 -> binary.
fn sniff_is_binary(sniff: &[u8]) -> bool {
    if sniff.contains(&0) {
        return true;
    }
    std::str::from_utf8(sniff).is_err()
}

fn last_modified_iso(metadata: &std::fs::Metadata) -> String {
    let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let ts = time::OffsetDateTime::from(modified);
    let truncated = ts.replace_nanosecond(0).unwrap_or(ts);
    truncated
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config() -> IndexingConfig {
        IndexingConfig::default()
    }

    #[test]
    fn test_discover_sorts_and_classifies() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
        fs::write(dir.path().join("README.md"), "# Title\n\nBody.\n").unwrap();

        let report = discover(dir.path(), &config()).expect("discover");
        let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "main.py"]);
        assert_eq!(report.files[1].category, FileCategory::Code);
        assert_eq!(report.files[0].category, FileCategory::Document);
    }

    #[test]
    fn test_git_directory_is_always_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/objects/pack"), b"binary\0data").unwrap();
        fs::write(dir.path().join("lib.rs"), "fn main() {}\n").unwrap();

        let report = discover(dir.path(), &config()).expect("discover");
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].path, "lib.rs");
    }

    #[test]
    fn test_security_denylist_excludes_secrets() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(".env"), "SECRET=1\n").unwrap();
        fs::write(dir.path().join("id_rsa"), "not a real key\n").unwrap();
        fs::write(dir.path().join("app.rs"), "fn main() {}\n").unwrap();

        let report = discover(dir.path(), &config()).expect("discover");
        let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["app.rs"]);
    }

    #[test]
    fn test_binary_file_has_no_text_hash() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("data.bin"), [0u8, 1, 2, 3, 0, 5]).unwrap();

        let report = discover(dir.path(), &config()).expect("discover");
        assert_eq!(report.files.len(), 1);
        assert!(report.files[0].is_binary);
        assert!(report.files[0].prov_text_hash.is_none());
        assert_eq!(report.files[0].category, FileCategory::Asset);
    }

    #[test]
    fn test_gitignore_is_honored() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(".gitignore"), "ignored_dir/\n*.log\n").unwrap();
        fs::create_dir_all(dir.path().join("ignored_dir")).unwrap();
        fs::write(dir.path().join("ignored_dir/x.rs"), "fn x() {}\n").unwrap();
        fs::write(dir.path().join("debug.log"), "log line\n").unwrap();
        fs::write(dir.path().join("keep.rs"), "fn keep() {}\n").unwrap();

        let report = discover(dir.path(), &config()).expect("discover");
        let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["keep.rs"]);
    }

    #[test]
    fn test_cr_lf_normalization_affects_line_count_not_hash_of_raw_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("crlf.txt"), "line one\r\nline two\r\n").unwrap();
        let report = discover(dir.path(), &config()).expect("discover");
        assert_eq!(report.files[0].line_count, 2);
    }
}
