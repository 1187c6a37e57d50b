//! ESS HTTP adapter (spec.md §6): `POST /query`, `GET /health`, `GET /metrics`.
//!
//! A thin axum router with no business logic of its own -- every request is
//! a direct call into [`ess_core::pipeline::Engine`], with auth, rate
//! limiting, and DTOs supplied by [`ess_core::server`]. Like `ess-mcp`, one
//! process can serve every project in the registry; the request body names
//! which project to query.

pub mod metrics;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ess_core::server::{
    now_iso8601, AuthGuard, ErrorResponse, HealthResponse, HealthStatus, HttpQueryRequest, RateLimiter, ServiceHealth,
};
use ess_core::watcher::ProjectRegistry;
use ess_core::{circuit::State as CircuitState, config::ApiConfig, Config, Engine, EssError};
use tokio::sync::Mutex;

use metrics::Metrics;

pub struct AppState {
    engines: Mutex<HashMap<String, Arc<Mutex<Engine>>>>,
    registry_path: PathBuf,
    auth: AuthGuard,
    rate_limiter: RateLimiter,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(registry_path: PathBuf, api_config: &ApiConfig) -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            registry_path,
            auth: AuthGuard::new(api_config),
            rate_limiter: RateLimiter::new(api_config.rate_limit_per_minute),
            metrics: Metrics::new(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

async fn engine_for(state: &AppState, project: &str) -> Result<Arc<Mutex<Engine>>, EssError> {
    let mut engines = state.engines.lock().await;
    if let Some(engine) = engines.get(project) {
        return Ok(engine.clone());
    }

    let registry = ProjectRegistry::load(&state.registry_path)?;
    let entry = registry
        .get(project)
        .ok_or_else(|| EssError::NotFound { entity: format!("project '{project}'") })?;
    let root = entry.root_dir.clone();
    let project_owned = project.to_string();

    let engine = tokio::task::spawn_blocking(move || {
        let config = Config::load(&root)?;
        Engine::open(&project_owned, config)
    })
    .await
    .map_err(|e| EssError::Internal(format!("engine open task panicked: {e}")))??;

    let engine = Arc::new(Mutex::new(engine));
    engines.insert(project.to_string(), engine.clone());
    Ok(engine)
}

async fn handle_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<HttpQueryRequest>,
) -> Response {
    let start = Instant::now();
    state.metrics.query_count.inc();

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if !state.auth.authenticate(token) {
        state.metrics.errors.inc();
        return error_response(StatusCode::UNAUTHORIZED, "invalid or missing bearer token");
    }

    let Some(project) = body.project.as_deref() else {
        state.metrics.errors.inc();
        return error_response(StatusCode::BAD_REQUEST, "'project' is required");
    };

    if !state.rate_limiter.allow(project) {
        state.metrics.errors.inc();
        return error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded for this project");
    }

    let engine = match engine_for(&state, project).await {
        Ok(engine) => engine,
        Err(e) => {
            state.metrics.errors.inc();
            return error_response(StatusCode::NOT_FOUND, &e.to_string());
        }
    };

    let request_id = body.request_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let conversational = body.mode.as_deref() == Some("conversational");

    let eng = engine.lock().await;
    let result = tokio::task::block_in_place(|| {
        if conversational {
            eng.query_with_conversation(&body.query, Some(&request_id))
        } else {
            eng.query(&body.query).map(|packet| ess_core::types::EngineResponse::Packet(Box::new(packet)))
        }
    });
    drop(eng);

    state.metrics.query_duration_seconds.observe(start.elapsed().as_secs_f64());

    match result {
        Ok(response) => {
            if let Some(packet) = response.packet() {
                if packet.status == ess_core::types::ResponseStatus::Unavailable {
                    state.metrics.errors.inc();
                }
            }
            Json(response).into_response()
        }
        Err(e) => {
            state.metrics.errors.inc();
            let status = match &e {
                EssError::Validation { .. } => StatusCode::BAD_REQUEST,
                EssError::NotFound { .. } => StatusCode::NOT_FOUND,
                EssError::BackendUnavailable { .. } | EssError::Timeout { .. } | EssError::CircuitOpen { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, &e.to_string())
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let engines = state.engines.lock().await;

    let mut services = HashMap::new();
    let mut any_open = false;
    let mut any_project_fully_down = false;

    for (project, engine) in engines.iter() {
        let eng = engine.lock().await;
        let mut graph_down = false;
        let mut vector_down = false;
        for (service, entry) in eng.circuits().snapshot() {
            any_open |= entry.state != CircuitState::Closed;
            if service == "graph" && entry.state == CircuitState::Open {
                graph_down = true;
            }
            if service == "vector" && entry.state == CircuitState::Open {
                vector_down = true;
            }
            state.metrics.set_circuit_state(&service, entry.state);
            services.insert(
                format!("{project}:{service}"),
                ServiceHealth {
                    state: match entry.state {
                        CircuitState::Closed => "closed".to_string(),
                        CircuitState::Open => "open".to_string(),
                        CircuitState::HalfOpen => "half_open".to_string(),
                    },
                    latency_ms: entry.latency_ms,
                    last_failure_secs_ago: entry.last_failure_secs_ago,
                },
            );
        }
        any_project_fully_down |= graph_down && vector_down;
    }

    let status = if any_project_fully_down {
        HealthStatus::Unhealthy
    } else if any_open {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse { status, services, timestamp: now_iso8601() }).into_response()
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string(), status: status.as_u16() })).into_response()
}
