//! Integration tests for the MCP tool surface.
//!
//! These drive [`ess_mcp::tools::ESSServer`]-equivalent behavior end to end
//! against a real [`Engine`] backed by a tempdir project, registered through
//! a tempdir-scoped project registry so tests never touch
//! `~/.veracity/projects.yaml`.
//!
//! `VERACITY_SKIP_MODEL_DOWNLOAD` is set so the embedder stays in degraded
//! (keyword-only) mode instead of reaching out to HuggingFace.

use std::io::Write as _;
use std::sync::Once;

use ess_core::watcher::{ProjectEntry, ProjectRegistry, WatchMode};
use ess_core::{Config, Engine};
use tempfile::TempDir;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        std::env::set_var("VERACITY_SKIP_MODEL_DOWNLOAD", "1");
    });
}

/// Write the sample Python + Rust fixture files used across these tests.
fn write_fixture_files(repo: &std::path::Path) {
    let py_path = repo.join("auth.py");
    let mut f = std::fs::File::create(&py_path).unwrap();
    writeln!(
        f,
        r#""""Authentication module."""

class AuthService:
    """Handles user authentication and authorization."""

    def __init__(self, db):
        self.db = db
        self.token_expiry = 3600

    def validate_token(self, token: str) -> bool:
        """Validate a JWT token."""
        if not token:
            return False
        return self.db.check_token(token)

    def login(self, username: str, password: str) -> str:
        """Authenticate a user and return a session token."""
        user = self.db.find_user(username)
        if user and user.check_password(password):
            return self.db.create_token(user)
        raise ValueError("Invalid credentials")

def create_auth_middleware(config):
    """Factory function for auth middleware."""
    return AuthService(config.db)
"#
    )
    .unwrap();

    let rs_path = repo.join("src/config.rs");
    std::fs::create_dir_all(rs_path.parent().unwrap()).unwrap();
    let mut f = std::fs::File::create(&rs_path).unwrap();
    writeln!(
        f,
        r#"//! Configuration loading.

use std::path::PathBuf;

/// Application configuration.
pub struct Config {{
    pub db_path: PathBuf,
    pub port: u16,
    pub debug: bool,
}}

impl Config {{
    /// Create default configuration.
    pub fn default() -> Self {{
        Self {{
            db_path: PathBuf::from("data.db"),
            port: 8080,
            debug: false,
        }}
    }}
}}
"#
    )
    .unwrap();
}

/// Build a tempdir-backed project, register it, index it, and return the
/// project name plus the tempdirs (repo + registry) that must outlive the
/// test.
async fn setup_indexed_project() -> (String, TempDir, TempDir) {
    init();
    let repo_dir = TempDir::new().expect("repo dir");
    write_fixture_files(repo_dir.path());

    let registry_dir = TempDir::new().expect("registry dir");
    let registry_path = registry_dir.path().join("projects.yaml");

    let project = "demo-project".to_string();
    let repo_path = repo_dir.path().to_path_buf();
    let registry_path_clone = registry_path.clone();
    let project_clone = project.clone();

    tokio::task::spawn_blocking(move || {
        let mut registry = ProjectRegistry::load(&registry_path_clone).expect("load registry");
        let mut entry = ProjectEntry::new(repo_path.clone());
        entry.watch_mode = WatchMode::Realtime;
        registry.register(&project_clone, entry);
        registry.save(&registry_path_clone).expect("save registry");

        let config = Config::defaults(&repo_path);
        let engine = Engine::open(&project_clone, config).expect("open engine");
        engine.index(false).expect("index fixture files");
    })
    .await
    .expect("spawn_blocking join");

    (project, repo_dir, registry_dir)
}

fn open_engine(project: &str, repo: &std::path::Path) -> Engine {
    let config = Config::defaults(repo);
    Engine::open(project, config).expect("reopen engine")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn index_then_status_reports_nonzero_counts() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let status = engine.status().expect("status");
    assert!(status.nodes_indexed > 0, "should have indexed nodes");
    assert!(status.chunks_indexed > 0, "should have produced chunks");
    assert!(!status.embedder_available, "embedder should stay degraded under VERACITY_SKIP_MODEL_DOWNLOAD");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_codebase_returns_evidence_packet_with_citations() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let packet = engine.query("authentication token validation").expect("query");
    assert_ne!(
        packet.status,
        ess_core::types::ResponseStatus::Unavailable,
        "keyword backend alone should still answer"
    );
    assert!(
        !packet.results.semantic.matches.is_empty() || !packet.results.structural.relationships.is_empty(),
        "packet should carry at least one kind of evidence"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_codebase_nonsense_query_does_not_crash() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let packet = engine.query("xyzzy_nonexistent_symbol_12345").expect("query");
    let _ = packet;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn component_map_groups_files_by_top_level_directory() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let map = engine.component_map().expect("component map");
    assert_eq!(map.total_files, 2);
    assert!(map.components.iter().any(|c| c.component == "."));
    assert!(map.components.iter().any(|c| c.component == "src"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_file_relationships_finds_edges_for_known_path() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let edges = engine.relationships_for_path("auth.py").expect("relationships");
    assert!(!edges.is_empty(), "auth.py should have at least a HAS_CHUNK edge");
    assert!(edges.iter().all(|e| e.project.as_str() == project));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_file_relationships_unknown_path_is_empty() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let edges = engine.relationships_for_path("does/not/exist.rs").expect("relationships");
    assert!(edges.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_files_reindexes_only_requested_paths() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let report = engine
        .ingest_paths(&["auth.py".to_string()])
        .expect("ingest_paths");
    assert_eq!(report.files_indexed, 1);
    assert!(report.files_skipped.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_files_missing_path_is_skipped_not_fatal() {
    let (project, repo_dir, _registry_dir) = setup_indexed_project().await;
    let engine = open_engine(&project, repo_dir.path());

    let report = engine
        .ingest_paths(&["auth.py".to_string(), "ghost.py".to_string()])
        .expect("ingest_paths");
    assert_eq!(report.files_indexed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_projects_reflects_registry_contents() {
    let (project, _repo_dir, registry_dir) = setup_indexed_project().await;
    let registry_path = registry_dir.path().join("projects.yaml");

    let registry = ProjectRegistry::load(&registry_path).expect("load registry");
    assert!(registry.get(&project).is_some());
    assert!(registry.get("unregistered-project").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn register_project_then_resolvable_via_registry() {
    let registry_dir = TempDir::new().expect("registry dir");
    let registry_path = registry_dir.path().join("projects.yaml");
    let repo_dir = TempDir::new().expect("repo dir");

    let root = repo_dir.path().to_path_buf();
    let mut registry = ProjectRegistry::load(&registry_path).expect("load registry");
    registry.register("new-project", ProjectEntry::new(root.clone()));
    registry.save(&registry_path).expect("save registry");

    let reloaded = ProjectRegistry::load(&registry_path).expect("reload registry");
    let entry = reloaded.get("new-project").expect("entry present");
    assert_eq!(entry.root_dir, root);
    assert_eq!(entry.watch_mode, WatchMode::Realtime);
}
