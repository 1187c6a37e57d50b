//! Integration tests for the HTTP adapter, driving the real axum router via
//! `tower::ServiceExt::oneshot` against a tempdir-backed project so tests
//! never touch `~/.veracity/projects.yaml`.

use std::io::Write as _;
use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ess_core::config::ApiConfig;
use ess_core::watcher::{ProjectEntry, ProjectRegistry, WatchMode};
use ess_core::Config;
use ess_server::AppState;
use tempfile::TempDir;
use tower::ServiceExt;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        std::env::set_var("VERACITY_SKIP_MODEL_DOWNLOAD", "1");
    });
}

fn write_fixture_file(repo: &std::path::Path) {
    let path = repo.join("auth.py");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        r#""""Authentication module."""

class AuthService:
    def validate_token(self, token: str) -> bool:
        return bool(token)
"#
    )
    .unwrap();
}

/// Register and index a tempdir project, returning the project name, its
/// registry path, and the tempdirs that must outlive the test.
async fn setup_indexed_project() -> (String, std::path::PathBuf, TempDir, TempDir) {
    init();
    let repo_dir = TempDir::new().expect("repo dir");
    write_fixture_file(repo_dir.path());

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
        let engine = ess_core::Engine::open(&project_clone, config).expect("open engine");
        engine.index(false).expect("index fixture files");
    })
    .await
    .expect("spawn_blocking join");

    (project, registry_path, repo_dir, registry_dir)
}

fn router(registry_path: std::path::PathBuf, api_config: ApiConfig) -> axum::Router {
    let state = Arc::new(AppState::new(registry_path, &api_config));
    ess_server::build_router(state)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_without_token_is_unauthorized_when_auth_configured() {
    let (project, registry_path, _repo_dir, _registry_dir) = setup_indexed_project().await;
    let api_config = ApiConfig { token: Some("secret".into()), rate_limit_per_minute: None };
    let app = router(registry_path, api_config);

    let body = serde_json::json!({ "query": "auth", "project": project });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_with_valid_token_returns_evidence_packet() {
    let (project, registry_path, _repo_dir, _registry_dir) = setup_indexed_project().await;
    let api_config = ApiConfig { token: Some("secret".into()), rate_limit_per_minute: None };
    let app = router(registry_path, api_config);

    let body = serde_json::json!({ "query": "authentication token validation", "project": project });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .header("authorization", "Bearer secret")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let packet: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(packet.get("meta").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_without_auth_configured_succeeds_with_no_header() {
    let (project, registry_path, _repo_dir, _registry_dir) = setup_indexed_project().await;
    let api_config = ApiConfig { token: None, rate_limit_per_minute: None };
    let app = router(registry_path, api_config);

    let body = serde_json::json!({ "query": "auth", "project": project });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_missing_project_is_bad_request() {
    let (_project, registry_path, _repo_dir, _registry_dir) = setup_indexed_project().await;
    let api_config = ApiConfig { token: None, rate_limit_per_minute: None };
    let app = router(registry_path, api_config);

    let body = serde_json::json!({ "query": "auth" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_unknown_project_is_not_found() {
    let (_project, registry_path, _repo_dir, _registry_dir) = setup_indexed_project().await;
    let api_config = ApiConfig { token: None, rate_limit_per_minute: None };
    let app = router(registry_path, api_config);

    let body = serde_json::json!({ "query": "auth", "project": "ghost-project" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reports_healthy_with_no_circuit_activity() {
    let (project, registry_path, _repo_dir, _registry_dir) = setup_indexed_project().await;
    let api_config = ApiConfig { token: None, rate_limit_per_minute: None };
    let app = router(registry_path, api_config);

    // Open the engine once via a query so it's cached in AppState, then ask for health.
    let body = serde_json::json!({ "query": "auth", "project": project });
    let query_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(query_response.status(), StatusCode::OK);

    let health_response = app
        .oneshot(Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health_response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(health_response.into_body(), usize::MAX).await.unwrap();
    let health: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metrics_endpoint_serves_prometheus_text() {
    let (_project, registry_path, _repo_dir, _registry_dir) = setup_indexed_project().await;
    let api_config = ApiConfig { token: None, rate_limit_per_minute: None };
    let app = router(registry_path, api_config);

    let response = app
        .oneshot(Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("query_count_total"));
    assert!(text.contains("circuit_state"));
}
