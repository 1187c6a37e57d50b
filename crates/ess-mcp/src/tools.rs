//! MCP tool definitions for ESS (spec.md §6 agent-tool adapter).
//!
//! Each tool maps 1:1 onto a core [`Engine`] operation; none bypasses
//! project scoping. Since an MCP server process can field queries for any
//! registered project, [`ESSServer`] keeps a lazily-populated map of open
//! engines keyed by project name rather than owning a single engine the way
//! the teacher's server did.
//!
//! ## Thread Safety
//!
//! `Engine` contains a `rusqlite::Connection` which is `!Sync`. Each engine
//! is wrapped in its own `tokio::sync::Mutex`, and the map of engines itself
//! is guarded by a second `tokio::sync::Mutex` (engines are opened rarely,
//! relative to how often they're queried, so the coarse lock is not a
//! bottleneck).

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::{
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
    ErrorData as McpError,
    ServerHandler,
};
use serde::Deserialize;
use tokio::sync::Mutex;

use ess_core::watcher::{ProjectEntry, ProjectRegistry, WatchMode};
use ess_core::{Config, Engine};

// -----------------------------------------------------------------------
// Parameter structs for each tool
// -----------------------------------------------------------------------

/// Parameters for `query_codebase`.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct QueryCodebaseParams {
    /// Registered project name.
    pub project: String,
    /// Natural-language query.
    pub query: String,
    /// Conversation to continue, for multi-round clarification (C10). Pass
    /// the same id back on the next call once the caller has answered the
    /// `questions` in a clarification response.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Parameters for `get_component_map`.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetComponentMapParams {
    /// Registered project name.
    pub project: String,
}

/// Parameters for `get_file_relationships`.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetFileRelationshipsParams {
    /// Registered project name.
    pub project: String,
    /// Repo-relative path to inspect.
    pub path: String,
}

/// Parameters for `register_project`.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RegisterProjectParams {
    /// Project name (slug) to register under.
    pub project: String,
    /// Absolute or relative repository root.
    pub root: String,
    /// Subdirectories to restrict watching to, relative to `root` (optional).
    #[serde(default)]
    pub target_dirs: Vec<String>,
    /// `"realtime"`, `"polling"`, or `"git-only"` (default `"realtime"`).
    pub watch_mode: Option<String>,
}

/// Parameters for `index_project`.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IndexProjectParams {
    /// Registered project name.
    pub project: String,
    /// Ignore the content-hash cache and re-index every file.
    #[serde(default)]
    pub force: bool,
}

/// Parameters for `ingest_files`.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IngestFilesParams {
    /// Registered project name.
    pub project: String,
    /// Repo-relative paths to (re)index.
    pub paths: Vec<String>,
}

// -----------------------------------------------------------------------
// MCP Server
// -----------------------------------------------------------------------

/// ESS MCP server: exposes code intelligence tools to AI coding agents
/// (spec.md §6 agent-tool adapter). Every tool is scoped to a project name
/// resolved through the project registry; none bypasses that scoping.
#[derive(Clone)]
pub struct ESSServer {
    engines: Arc<Mutex<HashMap<String, Arc<Mutex<Engine>>>>>,
    tool_router: ToolRouter<Self>,
}

impl ESSServer {
    /// Create a new MCP server. Engines are opened lazily per project on
    /// first use, resolved through the project registry at
    /// `Config::registry_path()`.
    pub fn new() -> Self {
        Self {
            engines: Arc::new(Mutex::new(HashMap::new())),
            tool_router: Self::tool_router(),
        }
    }

    fn registry(&self) -> Result<ProjectRegistry, McpError> {
        ProjectRegistry::load(&Config::registry_path())
            .map_err(|e| McpError::internal_error(format!("failed to load project registry: {e}"), None))
    }

    async fn engine_for(&self, project: &str) -> Result<Arc<Mutex<Engine>>, McpError> {
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(project) {
            return Ok(engine.clone());
        }

        let registry = self.registry()?;
        let entry = registry.get(project).ok_or_else(|| {
            McpError::invalid_params(
                format!("project '{project}' is not registered; call register_project first"),
                None,
            )
        })?;
        let root_dir = entry.root_dir.clone();

        let project_owned = project.to_string();
        let engine = tokio::task::spawn_blocking(move || {
            let config = Config::load(&root_dir)?;
            Engine::open(&project_owned, config)
        })
        .await
        .map_err(|e| McpError::internal_error(format!("engine task join error: {e}"), None))?
        .map_err(|e| McpError::internal_error(format!("failed to open engine: {e}"), None))?;

        let engine = Arc::new(Mutex::new(engine));
        engines.insert(project.to_string(), engine.clone());
        Ok(engine)
    }
}

impl Default for ESSServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl ESSServer {
    #[tool(
        name = "query_codebase",
        description = "Run a natural-language query against a registered project's hybrid query engine (semantic + structural search). Returns a versioned evidence packet with citations, veracity score, and warnings -- never freeform prose without sources. Pass `conversation_id` to continue a multi-round clarification dialog; an ambiguous query returns a conversation-typed response with `questions` instead of a packet."
    )]
    async fn query_codebase(
        &self,
        params: Parameters<QueryCodebaseParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine_for(&params.0.project).await?;
        let eng = engine.lock().await;
        let response = eng
            .query_with_conversation(&params.0.query, params.0.conversation_id.as_deref())
            .map_err(|e| McpError::internal_error(format!("query failed: {e}"), None))?;
        let json = serde_json::to_string_pretty(&response)
            .map_err(|e| McpError::internal_error(format!("failed to serialize response: {e}"), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "get_component_map",
        description = "Get a coarse-grained overview of a registered project: files, code entities, and languages grouped by top-level directory. Useful for orienting in an unfamiliar repository before drilling in with query_codebase."
    )]
    async fn get_component_map(
        &self,
        params: Parameters<GetComponentMapParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine_for(&params.0.project).await?;
        let eng = engine.lock().await;
        let map = eng
            .component_map()
            .map_err(|e| McpError::internal_error(format!("component map failed: {e}"), None))?;
        let json = serde_json::to_string_pretty(&map)
            .map_err(|e| McpError::internal_error(format!("failed to serialize map: {e}"), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "list_projects",
        description = "List every project registered in the project registry, with its repository root and watch mode."
    )]
    async fn list_projects(&self) -> Result<CallToolResult, McpError> {
        let registry = self.registry()?;
        let entries: Vec<serde_json::Value> = registry
            .iter()
            .map(|(name, entry)| {
                serde_json::json!({
                    "project": name,
                    "root_dir": entry.root_dir.display().to_string(),
                    "watch_mode": format!("{:?}", entry.watch_mode),
                    "enabled": entry.enabled,
                })
            })
            .collect();
        let json = serde_json::to_string_pretty(&serde_json::json!({ "projects": entries }))
            .map_err(|e| McpError::internal_error(format!("failed to serialize registry: {e}"), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "get_file_relationships",
        description = "Get every graph edge (DEFINES, CALLS, IMPORTS, DEPENDS_ON, MENTIONS, ...) touching a file or its code entities in a registered project. Use this to answer 'what depends on this file' or 'what does this file import'."
    )]
    async fn get_file_relationships(
        &self,
        params: Parameters<GetFileRelationshipsParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine_for(&params.0.project).await?;
        let eng = engine.lock().await;
        let edges = eng
            .relationships_for_path(&params.0.path)
            .map_err(|e| McpError::internal_error(format!("relationship lookup failed: {e}"), None))?;
        let json = serde_json::to_string_pretty(&edges)
            .map_err(|e| McpError::internal_error(format!("failed to serialize edges: {e}"), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "register_project",
        description = "Register a new project with the project registry, giving it a name and repository root so it can later be queried and indexed. Does not index the project -- call index_project afterward."
    )]
    async fn register_project(
        &self,
        params: Parameters<RegisterProjectParams>,
    ) -> Result<CallToolResult, McpError> {
        let root_dir = std::path::PathBuf::from(&params.0.root);
        let root_dir = root_dir
            .canonicalize()
            .map_err(|e| McpError::invalid_params(format!("cannot resolve root '{}': {e}", params.0.root), None))?;

        let watch_mode = match params.0.watch_mode.as_deref() {
            None | Some("realtime") => WatchMode::Realtime,
            Some("polling") => WatchMode::Polling,
            Some("git-only") => WatchMode::GitOnly,
            Some(other) => {
                return Err(McpError::invalid_params(format!("unknown watch_mode '{other}'"), None));
            }
        };

        let mut entry = ProjectEntry::new(root_dir.clone());
        entry.target_dirs = params.0.target_dirs.iter().map(std::path::PathBuf::from).collect();
        entry.watch_mode = watch_mode;

        let registry_path = Config::registry_path();
        let mut registry = ProjectRegistry::load(&registry_path)
            .map_err(|e| McpError::internal_error(format!("failed to load registry: {e}"), None))?;
        registry.register(&params.0.project, entry);
        registry
            .save(&registry_path)
            .map_err(|e| McpError::internal_error(format!("failed to save registry: {e}"), None))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "registered '{}' -> {}",
            params.0.project,
            root_dir.display()
        ))]))
    }

    #[tool(
        name = "index_project",
        description = "Run the full write path (discover, parse, chunk, embed, write) for a registered project. Unchanged files are skipped unless force is set."
    )]
    async fn index_project(
        &self,
        params: Parameters<IndexProjectParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine_for(&params.0.project).await?;
        let eng = engine.lock().await;
        let force = params.0.force;
        let report = tokio::task::block_in_place(|| eng.index(force))
            .map_err(|e| McpError::internal_error(format!("indexing failed: {e}"), None))?;
        let json = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|_| format!("{report:?}"));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        name = "ingest_files",
        description = "Re-index exactly the given repo-relative paths in a registered project, without discovering the rest of the tree. Use this after a targeted edit (e.g. from a git diff) instead of a full index_project."
    )]
    async fn ingest_files(
        &self,
        params: Parameters<IngestFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine_for(&params.0.project).await?;
        let eng = engine.lock().await;
        let paths = params.0.paths;
        let report = tokio::task::block_in_place(|| eng.ingest_paths(&paths))
            .map_err(|e| McpError::internal_error(format!("ingest failed: {e}"), None))?;
        let json = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|_| format!("{report:?}"));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for ESSServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "ESS provides deterministic, evidence-based code intelligence over registered \
                 projects. Use query_codebase for natural-language questions (returns a cited \
                 evidence packet, not freeform prose), get_component_map to orient in an \
                 unfamiliar repo, get_file_relationships for dependency questions, and \
                 register_project / index_project / ingest_files to manage what's indexed."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}
