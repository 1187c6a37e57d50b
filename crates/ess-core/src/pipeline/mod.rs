//! Ingestion and query orchestration (C1-C8, spec.md §4.5/§4.6).
//!
//! `Engine` owns one project's durable state (graph store, vector store,
//! in-memory dependency graph) and the shared machinery every query runs
//! through (circuit breakers, the conversation manager, the audit log). It
//! is the thing every adapter (`ess-cli`, `ess-daemon`, `ess-mcp`) drives;
//! none of them talk to `store`/`vector`/`search` directly.
//!
//! Indexing runs in two passes so that cross-file references (a function
//! call into a file that didn't change this run) can still be resolved:
//! pass one parses every changed file and rebuilds a project-wide symbol
//! table seeded from what's already in the graph store; pass two chunks,
//! embeds, and writes each changed file using that table.

use std::collections::BTreeMap;
use std::sync::Mutex;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::audit::AuditLog;
use crate::chunker;
use crate::circuit::CircuitBreakerRegistry;
use crate::config::Config;
use crate::conversation::{ConversationManager, Turn};
use crate::discovery::{self, FileMetadata, SkippedFile};
use crate::embedder::Embedder;
use crate::error::EssResult;
use crate::graph::DependencyGraph;
use crate::ids::{self, ProjectId};
use crate::parser::{self, StructuralElement};
use crate::search::SearchEngine;
use crate::store::{FileIngestion, GraphStore};
use crate::types::{
    ClarificationResponse, CodeEntity, DependencyKind, DocumentNode, Edge, EdgeKind, EngineResponse,
    FileCategory, FileNode, PipelineEvent, Provenance, QueryResponse,
};
use crate::vector::VectorStore;
use crate::veracity::GraphSnapshot;

/// Folds the parser's open [`DependencyKind`] hints onto the closed
/// [`EdgeKind`] set persisted by the store (spec.md §3, I1).
pub fn map_dependency_kind(kind: DependencyKind) -> EdgeKind {
    match kind {
        DependencyKind::Imports => EdgeKind::Imports,
        DependencyKind::Calls => EdgeKind::Calls,
        DependencyKind::Extends
        | DependencyKind::Implements
        | DependencyKind::UsesType
        | DependencyKind::Instantiates
        | DependencyKind::FieldAccess => EdgeKind::DependsOn,
    }
}

/// Outcome of one [`Engine::index`] call.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexReport {
    /// Files newly indexed or re-indexed because their content changed.
    pub files_indexed: usize,
    /// Files left untouched because `prov_file_hash` matched the store.
    pub files_unchanged: usize,
    /// Files present before this run but no longer discovered; removed.
    pub files_removed: usize,
    /// Files discovery could not read.
    pub files_skipped: Vec<SkippedFile>,
    /// Code entities written across every re-indexed file.
    pub code_entities_indexed: usize,
    /// Chunks written across every re-indexed file.
    pub chunks_indexed: usize,
    /// Chunks that produced a usable embedding.
    pub embeddings_written: usize,
    /// Wall-clock time for the whole run, milliseconds.
    pub elapsed_ms: u64,
}

/// Snapshot of one project's indexed state (spec.md §6 `status`).
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// Project slug.
    pub project: String,
    /// Total node rows (File + Code entity + Document).
    pub nodes_indexed: u64,
    /// Total chunks.
    pub chunks_indexed: u64,
    /// Total edges.
    pub edges_indexed: u64,
    /// Whether the in-memory dependency graph contains a cycle.
    pub has_cycles: bool,
    /// Whether the embedder is serving real vectors rather than running degraded.
    pub embedder_available: bool,
}

/// One project's durable state and the machinery its queries run through.
pub struct Engine {
    project: ProjectId,
    config: Config,
    store: Mutex<GraphStore>,
    vector: Mutex<VectorStore>,
    embedder: Embedder,
    search_engine: SearchEngine,
    dep_graph: DependencyGraph,
    circuits: CircuitBreakerRegistry,
    conversations: ConversationManager,
    audit: AuditLog,
}

impl Engine {
    /// Open (creating on first use) every durable store for `project` and
    /// register it, then rebuild the in-memory dependency graph from disk.
    pub fn open(project: &str, config: Config) -> EssResult<Self> {
        let project = ProjectId::new(project)?;
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let mut store = GraphStore::open(&data_dir.join("graph.db"))?;
        store.register_project(&project, &config.repo_path.to_string_lossy(), &now_iso8601())?;

        let vector = VectorStore::open(
            &data_dir.join(format!("{}.vectors", project.as_str())),
            config.embedding.dims,
        )?;

        let embedder = Embedder::new(&config.embedding)?;
        let search_engine = SearchEngine::new(config.search.clone());
        let circuits = CircuitBreakerRegistry::new(config.circuit.clone());
        let audit = AuditLog::new(&data_dir);

        let dep_graph = DependencyGraph::new();
        for edge in store.all_edges(&project)? {
            dep_graph.add_edge(&edge)?;
        }

        Ok(Self {
            project,
            config,
            store: Mutex::new(store),
            vector: Mutex::new(vector),
            embedder,
            search_engine,
            dep_graph,
            circuits,
            conversations: ConversationManager::new(),
            audit,
        })
    }

    /// Project slug this engine is scoped to.
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Repository root being indexed.
    pub fn repo_path(&self) -> &std::path::Path {
        &self.config.repo_path
    }

    /// Apply one pipeline event (from a watcher or a manual trigger).
    pub fn handle_event(&self, event: PipelineEvent) -> EssResult<()> {
        match event {
            PipelineEvent::FileChanged { path } | PipelineEvent::FileDeleted { path } => {
                self.reindex_path(&path.to_string_lossy())
            }
            PipelineEvent::FullScan => self.index(false).map(|_| ()),
            PipelineEvent::Shutdown => Ok(()),
        }
    }

    /// Re-index (or remove, if it no longer exists on disk) a single path.
    /// Cheaper than a full `index()` pass for watcher-driven updates, at the
    /// cost of not refreshing cross-file references that point *into* this
    /// file from elsewhere (those heal on the next full scan).
    fn reindex_path(&self, rel_path: &str) -> EssResult<()> {
        let abs_path = self.config.repo_path.join(rel_path);
        if !abs_path.exists() {
            self.remove_path(rel_path)?;
            self.rebuild_dep_graph()?;
            return Ok(());
        }

        let report = discovery::discover(&self.config.repo_path, &self.config.indexing)?;
        let Some(meta) = report.files.into_iter().find(|f| f.path == rel_path) else {
            return Ok(());
        };

        let symbols = self.load_symbol_table()?;
        let module_map = module_map_from(std::slice::from_ref(&meta));
        self.ingest_one(&meta, &symbols, &module_map)?;
        self.rebuild_dep_graph()?;
        Ok(())
    }

    /// Run a full indexing pass: discover every file under the repo root,
    /// skip files whose content hash is unchanged (unless `force`), parse
    /// and write everything else, then remove files that disappeared.
    pub fn index(&self, force: bool) -> EssResult<IndexReport> {
        let start = std::time::Instant::now();
        let report = discovery::discover(&self.config.repo_path, &self.config.indexing)?;

        let existing_paths: std::collections::BTreeSet<String> = self
            .store
            .lock()
            .expect("store lock poisoned")
            .all_paths(&self.project)?
            .into_iter()
            .collect();
        let discovered_paths: std::collections::BTreeSet<String> =
            report.files.iter().map(|f| f.path.clone()).collect();

        let mut changed = Vec::new();
        let mut unchanged = 0usize;
        {
            let store = self.store.lock().expect("store lock poisoned");
            for meta in &report.files {
                let current_hash = store.file_hash(&self.project, &meta.path)?;
                if !force && current_hash.as_deref() == Some(meta.prov_file_hash.as_str()) {
                    unchanged += 1;
                } else {
                    changed.push(meta.clone());
                }
            }
        }

        let module_map = module_map_from(&report.files);
        let symbols = self.load_symbol_table()?;

        let mut code_entities_indexed = 0usize;
        let mut chunks_indexed = 0usize;
        let mut embeddings_written = 0usize;

        for meta in &changed {
            let stats = self.ingest_one(meta, &symbols, &module_map)?;
            code_entities_indexed += stats.0;
            chunks_indexed += stats.1;
            embeddings_written += stats.2;
        }

        let removed: Vec<&String> = existing_paths.difference(&discovered_paths).collect();
        for path in &removed {
            self.remove_path(path)?;
        }

        self.rebuild_dep_graph()?;
        self.vector.lock().expect("vector lock poisoned").flush()?;

        Ok(IndexReport {
            files_indexed: changed.len(),
            files_unchanged: unchanged,
            files_removed: removed.len(),
            files_skipped: report.skipped,
            code_entities_indexed,
            chunks_indexed,
            embeddings_written,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Remove a file (and everything derived from it) from both stores.
    fn remove_path(&self, path: &str) -> EssResult<()> {
        let chunk_ids = self
            .store
            .lock()
            .expect("store lock poisoned")
            .chunk_ids_for_path(&self.project, path)?;
        self.store.lock().expect("store lock poisoned").delete_file(&self.project, path)?;

        let mut vector = self.vector.lock().expect("vector lock poisoned");
        for chunk_id in chunk_ids {
            vector.remove(&chunk_id)?;
        }
        Ok(())
    }

    /// Seed the cross-file symbol table from whatever is already durable.
    /// Entries for files re-parsed this run are overwritten before use.
    fn load_symbol_table(&self) -> EssResult<SymbolTable> {
        let store = self.store.lock().expect("store lock poisoned");
        let mut table = SymbolTable::default();
        for entity in store.all_code_entities(&self.project)? {
            table.insert(&entity.qualified_name, &entity.name, &entity.uid);
        }
        Ok(table)
    }

    /// Parse, chunk, embed, and write one file. Returns
    /// `(code_entities, chunks, embeddings)` counts.
    fn ingest_one(
        &self,
        meta: &FileMetadata,
        base_symbols: &SymbolTable,
        module_map: &BTreeMap<String, String>,
    ) -> EssResult<(usize, usize, usize)> {
        let file_uid = ids::node_uid(self.project.as_str(), &meta.path, "");
        let indexed_at = now_iso8601();
        let file_provenance = Provenance {
            file_hash: meta.prov_file_hash.clone(),
            text_hash: meta.prov_text_hash.clone(),
            extractor_version: self.config.extractor_version.clone(),
            indexed_at: indexed_at.clone(),
        };

        let file_node = FileNode {
            project: self.project.clone(),
            uid: file_uid.clone(),
            path: meta.path.clone(),
            language: meta.language,
            size_bytes: meta.size_bytes,
            category: meta.category,
            provenance: file_provenance.clone(),
        };

        if meta.category == FileCategory::Asset || meta.is_binary {
            let ingestion = FileIngestion {
                file: file_node,
                code_entities: Vec::new(),
                document: None,
                chunks: Vec::new(),
                edges: Vec::new(),
            };
            self.store.lock().expect("store lock poisoned").ingest_file(&self.project, &ingestion)?;
            return Ok((0, 0, 0));
        }

        let raw = std::fs::read(&meta.abs_path)?;
        let source_text = ids::normalize_text(&String::from_utf8_lossy(&raw));

        let elements = parser::parse_file(&meta.abs_path, source_text.as_bytes(), meta.language)
            .unwrap_or_default();
        let imports = parser::parse_imports(&meta.abs_path, source_text.as_bytes(), meta.language)
            .unwrap_or_default();

        let mut symbols = base_symbols.clone();
        let mut entity_uids: Vec<String> = Vec::new();
        if meta.category == FileCategory::Code {
            for elem in &elements {
                let uid = ids::node_uid(self.project.as_str(), &meta.path, &elem.symbol_path);
                symbols.insert(&elem.symbol_path, &elem.name, &uid);
                entity_uids.push(uid);
            }
        }

        let (code_entities, document) = match meta.category {
            FileCategory::Code => {
                let entities: Vec<CodeEntity> = elements
                    .iter()
                    .zip(entity_uids.iter())
                    .map(|(elem, uid)| code_entity_from(&self.project, meta, elem, uid, &file_provenance))
                    .collect();
                (entities, None)
            }
            FileCategory::Document | FileCategory::Config => {
                let title = elements
                    .first()
                    .map(|e| e.name.clone())
                    .filter(|n| !n.is_empty() && n != &meta.path);
                let uid = ids::node_uid(self.project.as_str(), &meta.path, "");
                (
                    Vec::new(),
                    Some(DocumentNode {
                        project: self.project.clone(),
                        uid,
                        path: meta.path.clone(),
                        title,
                        provenance: file_provenance.clone(),
                    }),
                )
            }
            FileCategory::Asset => (Vec::new(), None),
        };

        let chunks = match meta.category {
            FileCategory::Code => chunker::chunk_code(
                &self.project,
                &meta.path,
                &elements,
                self.config.indexing.chunk_size_tokens,
                &file_provenance,
            ),
            FileCategory::Document => chunker::chunk_document(
                &self.project,
                &meta.path,
                &source_text,
                self.config.indexing.chunk_size_tokens,
                &file_provenance,
            ),
            FileCategory::Config => chunker::chunk_config(
                &self.project,
                &meta.path,
                &source_text,
                self.config.indexing.chunk_size_tokens,
                &file_provenance,
            ),
            FileCategory::Asset => Vec::new(),
        };

        let mut edges = Vec::new();
        match meta.category {
            FileCategory::Code => {
                for (elem, uid) in elements.iter().zip(entity_uids.iter()) {
                    edges.push(Edge {
                        project: self.project.clone(),
                        source_uid: file_uid.clone(),
                        target_uid: uid.clone(),
                        kind: EdgeKind::Defines,
                        line: Some(elem.line_start),
                    });
                    for reference in &elem.references {
                        if let Some(target) = symbols.resolve(reference) {
                            if &target != uid {
                                edges.push(Edge {
                                    project: self.project.clone(),
                                    source_uid: uid.clone(),
                                    target_uid: target,
                                    kind: EdgeKind::Calls,
                                    line: Some(elem.line_start),
                                });
                            }
                        }
                    }
                }
                for import in &imports {
                    if let Some(target_path) = resolve_import(&import.import_path, module_map) {
                        let target_uid = ids::node_uid(self.project.as_str(), &target_path, "");
                        if target_uid != file_uid {
                            edges.push(Edge {
                                project: self.project.clone(),
                                source_uid: file_uid.clone(),
                                target_uid,
                                kind: map_dependency_kind(import.kind),
                                line: Some(import.line),
                            });
                        }
                    }
                }
            }
            FileCategory::Document => {
                if let Some(doc) = &document {
                    for (_, uid) in symbols.mentions_in(&source_text) {
                        edges.push(Edge {
                            project: self.project.clone(),
                            source_uid: doc.uid.clone(),
                            target_uid: uid,
                            kind: EdgeKind::Mentions,
                            line: None,
                        });
                    }
                }
            }
            FileCategory::Config | FileCategory::Asset => {}
        }

        let owner_uid = match &document {
            Some(doc) => doc.uid.clone(),
            None => file_uid.clone(),
        };
        for chunk in &chunks {
            edges.push(Edge {
                project: self.project.clone(),
                source_uid: owner_uid.clone(),
                target_uid: chunk.chunk_id.clone(),
                kind: EdgeKind::HasChunk,
                line: None,
            });
        }

        let previous_chunk_ids = self
            .store
            .lock()
            .expect("store lock poisoned")
            .chunk_ids_for_path(&self.project, &meta.path)?;

        let code_entity_count = code_entities.len();
        let chunk_count = chunks.len();
        let ingestion = FileIngestion {
            file: file_node,
            code_entities,
            document,
            chunks: chunks.clone(),
            edges,
        };
        self.store.lock().expect("store lock poisoned").ingest_file(&self.project, &ingestion)?;

        let current_chunk_ids: std::collections::BTreeSet<&str> =
            chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        let mut vector = self.vector.lock().expect("vector lock poisoned");
        for stale in previous_chunk_ids
            .iter()
            .filter(|id| !current_chunk_ids.contains(id.as_str()))
        {
            vector.remove(stale)?;
        }

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self.embedder.embed_documents(&contents);
        let mut embeddings_written = 0usize;
        for (chunk, embedding) in chunks.iter().zip(embeddings.into_iter()) {
            if let Some(vec) = embedding {
                vector.upsert(&chunk.chunk_id, vec)?;
                embeddings_written += 1;
            }
        }

        Ok((code_entity_count, chunk_count, embeddings_written))
    }

    fn rebuild_dep_graph(&self) -> EssResult<()> {
        self.dep_graph.clear();
        let store = self.store.lock().expect("store lock poisoned");
        for edge in store.all_edges(&self.project)? {
            self.dep_graph.add_edge(&edge)?;
        }
        Ok(())
    }

    /// Run one query in one-shot mode (no conversational clarification).
    pub fn query(&self, raw_query: &str) -> EssResult<QueryResponse> {
        self.run_query(raw_query)
    }

    /// Run one query, optionally continuing a multi-round clarification
    /// dialog identified by `conversation_id`. When the conversation manager
    /// decides the query is still ambiguous, no search runs at all --
    /// the caller gets back a [`ClarificationResponse`] instead of a packet,
    /// and is expected to re-submit with the same `conversation_id` once the
    /// caller (human or agent) has answered the questions. Once the
    /// conversation resolves, the search runs against the enriched query
    /// text accumulated across every round, not just the latest turn.
    pub fn query_with_conversation(
        &self,
        raw_query: &str,
        conversation_id: Option<&str>,
    ) -> EssResult<EngineResponse> {
        let Some(id) = conversation_id else {
            return Ok(EngineResponse::Packet(Box::new(self.run_query(raw_query)?)));
        };

        match self.conversations.advance(id, raw_query) {
            Turn::NeedsClarification { questions, round } => Ok(EngineResponse::Clarification(ClarificationResponse {
                schema_version: "1.0".into(),
                request_id: uuid::Uuid::new_v4().to_string(),
                response_type: ClarificationResponse::RESPONSE_TYPE.to_string(),
                timestamp: now_iso8601(),
                conversation_id: id.to_string(),
                round,
                questions,
            })),
            Turn::Resolved { query, .. } => Ok(EngineResponse::Packet(Box::new(self.run_query(&query)?))),
        }
    }

    /// Run the search pipeline against `query_text` and audit the result.
    /// Shared by both [`Engine::query`] and the resolved branch of
    /// [`Engine::query_with_conversation`].
    fn run_query(&self, query_text: &str) -> EssResult<QueryResponse> {
        let store = self.store.lock().expect("store lock poisoned");
        let vector = self.vector.lock().expect("vector lock poisoned");
        let snapshot = StoreSnapshot {
            store: &store,
            vector: &vector,
            graph: &self.dep_graph,
            project: &self.project,
        };

        let db_path = self.config.data_dir().join("graph.db");
        let request_id = uuid::Uuid::new_v4().to_string();

        let packet = self.search_engine.query(
            &self.project,
            query_text,
            &request_id,
            &store,
            &vector,
            &db_path,
            &self.embedder,
            &self.circuits,
            &snapshot,
        );

        if let Err(e) = self.audit.record(&request_id, &packet) {
            tracing::warn!(error = %e, "failed to append audit record");
        }

        Ok(packet)
    }

    /// Current indexed-state summary for this project.
    pub fn status(&self) -> EssResult<EngineStatus> {
        let store = self.store.lock().expect("store lock poisoned");
        Ok(EngineStatus {
            project: self.project.as_str().to_string(),
            nodes_indexed: store.node_count(&self.project)?,
            chunks_indexed: store.chunk_count(&self.project)?,
            edges_indexed: store.edge_count(&self.project)?,
            has_cycles: self.dep_graph.has_cycles(),
            embedder_available: self.embedder.is_available(),
        })
    }

    /// The circuit breaker registry backing this engine's query path, for
    /// the HTTP/daemon health endpoints.
    pub fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.circuits
    }

    /// Every edge touching a path's File node or one of its Code entities
    /// (agent-tool adapter `get_file_relationships`, spec.md §6).
    pub fn relationships_for_path(&self, path: &str) -> EssResult<Vec<crate::types::Edge>> {
        let store = self.store.lock().expect("store lock poisoned");
        store.relationships_for_path(&self.project, path)
    }

    /// A coarse-grained summary of the repository grouped by top-level
    /// directory (agent-tool adapter `get_component_map`, spec.md §6).
    pub fn component_map(&self) -> EssResult<crate::types::ComponentMap> {
        use crate::types::{ComponentMap, ComponentMapEntry};

        let store = self.store.lock().expect("store lock poisoned");
        let files = store.all_files(&self.project)?;
        let entities = store.all_code_entities(&self.project)?;
        drop(store);

        let mut by_component: BTreeMap<String, (usize, Vec<String>)> = BTreeMap::new();
        for (path, language) in &files {
            let component = top_level_component(path);
            let entry = by_component.entry(component).or_insert_with(|| (0, Vec::new()));
            entry.0 += 1;
            if let Some(lang) = language {
                if !entry.1.contains(lang) {
                    entry.1.push(lang.clone());
                }
            }
        }

        let mut entity_counts: BTreeMap<String, usize> = BTreeMap::new();
        for entity in &entities {
            *entity_counts.entry(top_level_component(&entity.path)).or_insert(0) += 1;
        }

        let components: Vec<ComponentMapEntry> = by_component
            .into_iter()
            .map(|(component, (file_count, languages))| ComponentMapEntry {
                code_entity_count: entity_counts.get(&component).copied().unwrap_or(0),
                component,
                file_count,
                languages,
            })
            .collect();

        Ok(ComponentMap {
            project: self.project.as_str().to_string(),
            total_files: files.len(),
            total_code_entities: entities.len(),
            components,
        })
    }

    /// Re-index (or remove) exactly the given repo-relative paths, skipping
    /// discovery of the rest of the tree. Used by the agent-tool adapter's
    /// `ingest_files` (spec.md §6) and the `git_only` watch mode, where the
    /// caller already knows which paths changed (e.g. from `git diff`).
    pub fn ingest_paths(&self, paths: &[String]) -> EssResult<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport::default();

        for path in paths {
            match self.reindex_path(path) {
                Ok(()) => report.files_indexed += 1,
                Err(e) => report.files_skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        report.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(report)
    }
}

/// The first path segment, or `"."` for a file directly under the repo root.
fn top_level_component(path: &str) -> String {
    match path.split('/').next() {
        Some(first) if path.contains('/') => first.to_string(),
        _ => ".".to_string(),
    }
}

/// Builds a Code entity from one parsed element and its already-resolved uid.
fn code_entity_from(
    project: &ProjectId,
    meta: &FileMetadata,
    elem: &StructuralElement,
    uid: &str,
    file_provenance: &Provenance,
) -> CodeEntity {
    CodeEntity {
        project: project.clone(),
        uid: uid.to_string(),
        path: meta.path.clone(),
        qualified_name: elem.symbol_path.clone(),
        name: elem.name.clone(),
        kind: elem.kind,
        visibility: elem.visibility,
        line_start: elem.line_start,
        line_end: elem.line_end,
        doc_comment: elem.doc_comment.clone(),
        provenance: file_provenance.clone(),
    }
}

/// `module name (path with extension stripped) -> path`, used to resolve
/// `import "some.module"`-style statements to the File node they point at.
fn module_map_from(files: &[FileMetadata]) -> BTreeMap<String, String> {
    files
        .iter()
        .filter(|f| f.category == FileCategory::Code)
        .map(|f| {
            let module_name = parser::build_module_name_from_path(std::path::Path::new(&f.path));
            (module_name, f.path.clone())
        })
        .collect()
}

/// Best-effort resolution of a raw import path to a discovered file.
///
/// Import syntax varies wildly across languages (`os.path`, `crate::config`,
/// `./utils`); rather than modeling each language's resolution rules, this
/// normalizes separators and looks for a module whose name matches or ends
/// with the normalized import, which handles the common case (an import
/// naming a fully- or partially-qualified module path relative to the
/// project root) without a full per-language resolver.
fn resolve_import(import_path: &str, module_map: &BTreeMap<String, String>) -> Option<String> {
    let normalized = import_path
        .trim_start_matches("./")
        .trim_start_matches("../")
        .trim_start_matches("crate::")
        .trim_start_matches('.')
        .replace("::", "/")
        .replace('.', "/");
    if normalized.is_empty() {
        return None;
    }

    module_map
        .iter()
        .find(|(module_name, _)| {
            module_name.as_str() == normalized || module_name.ends_with(&format!("/{normalized}"))
        })
        .map(|(_, path)| path.clone())
}

/// Cross-file qualified-name / short-name index, rebuilt at the start of
/// each indexing pass and consulted while resolving `references` within a
/// file being (re-)parsed.
#[derive(Debug, Clone, Default)]
struct SymbolTable {
    qualified: BTreeMap<String, String>,
    by_name: BTreeMap<String, Vec<String>>,
}

impl SymbolTable {
    fn insert(&mut self, qualified_name: &str, name: &str, uid: &str) {
        self.qualified.insert(qualified_name.to_string(), uid.to_string());
        let entry = self.by_name.entry(name.to_string()).or_default();
        if !entry.iter().any(|u| u == uid) {
            entry.push(uid.to_string());
        }
    }

    /// Resolve a reference (as recorded on [`StructuralElement::references`])
    /// to a uid: exact qualified-name match first, falling back to the
    /// first (sorted, so deterministic) short-name match.
    fn resolve(&self, reference: &str) -> Option<String> {
        if let Some(uid) = self.qualified.get(reference) {
            return Some(uid.clone());
        }
        let short = reference.rsplit(['.', ':']).next().unwrap_or(reference);
        self.by_name.get(short).and_then(|uids| uids.first().cloned())
    }

    /// Scan free text for word-boundary occurrences of known short names,
    /// capped to keep MENTIONS edges bounded and deterministic. Only names
    /// of at least 4 characters are considered, so incidental English words
    /// don't produce spurious mentions.
    fn mentions_in(&self, text: &str) -> Vec<(String, String)> {
        const MAX_MENTIONS: usize = 50;
        let mut found = Vec::new();
        for (name, uids) in &self.by_name {
            if name.len() < 4 {
                continue;
            }
            if contains_word(text, name) {
                found.push((name.clone(), uids[0].clone()));
                if found.len() >= MAX_MENTIONS {
                    break;
                }
            }
        }
        found
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        let end = start + needle.len();
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        before_ok && after_ok
    })
}

/// Adapts [`GraphStore`] + [`DependencyGraph`] to the [`GraphSnapshot`]
/// trait the veracity validator needs, without either module depending on
/// the other.
struct StoreSnapshot<'a> {
    store: &'a GraphStore,
    vector: &'a VectorStore,
    graph: &'a DependencyGraph,
    project: &'a ProjectId,
}

impl GraphSnapshot for StoreSnapshot<'_> {
    fn degree(&self, uid: &str) -> usize {
        self.graph.degree(uid).unwrap_or(0)
    }

    fn document_last_modified(&self, uid: &str) -> Option<OffsetDateTime> {
        // Chunks carry the owning file's provenance; a chunk/document uid's
        // mtime is its file's `indexed_at` (the closest durable proxy to
        // mtime kept today, since the store doesn't round-trip filesystem
        // mtimes onto nodes).
        let chunk = self.store.get_chunk(self.project, uid).ok().flatten()?;
        parse_rfc3339(&chunk.provenance.indexed_at)
    }

    fn code_last_modified(&self, uid: &str) -> Option<OffsetDateTime> {
        let entity = self.store.get_code_entity(self.project, uid).ok().flatten()?;
        parse_rfc3339(&entity.provenance.indexed_at)
    }

    fn has_embedding(&self, uid: &str) -> bool {
        let is_embeddable = self.store.get_chunk(self.project, uid).ok().flatten().is_some()
            || self.store.get_code_entity(self.project, uid).ok().flatten().is_some();
        if is_embeddable {
            self.vector.contains(uid)
        } else {
            true
        }
    }

    fn mentioned_code_uids(&self, document_uid: &str) -> Vec<String> {
        self.store
            .relationships_for_path(self.project, document_uid)
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Mentions)
            .map(|e| e.target_uid)
            .collect()
    }

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

fn parse_rfc3339(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(repo: &std::path::Path, rel: &str, content: &str) {
        let path = repo.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn test_engine(repo: &std::path::Path) -> Engine {
        let cfg = Config::defaults(repo);
        let mut engine = Engine::open("demo-project", cfg).expect("open engine");
        engine.embedder = Embedder::degraded(&engine.config.embedding.clone());
        engine
    }

    #[test]
    fn test_index_single_rust_file() {
        let repo = tempfile::tempdir().expect("repo dir");
        write(
            repo.path(),
            "src/lib.rs",
            "pub fn hello() -> &'static str {\n    \"hi\"\n}\n",
        );

        let engine = test_engine(repo.path());
        let report = engine.index(false).expect("index");
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_unchanged, 0);

        let status = engine.status().expect("status");
        assert!(status.nodes_indexed >= 1);
    }

    #[test]
    fn test_reindex_is_incremental() {
        let repo = tempfile::tempdir().expect("repo dir");
        write(repo.path(), "src/lib.rs", "pub fn hello() {}\n");

        let engine = test_engine(repo.path());
        engine.index(false).expect("first index");
        let second = engine.index(false).expect("second index");
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_unchanged, 1);
    }

    #[test]
    fn test_removed_file_is_deleted_from_store() {
        let repo = tempfile::tempdir().expect("repo dir");
        write(repo.path(), "src/a.rs", "pub fn a() {}\n");

        let engine = test_engine(repo.path());
        engine.index(false).expect("index");
        std::fs::remove_file(repo.path().join("src/a.rs")).unwrap();

        let report = engine.index(false).expect("reindex after removal");
        assert_eq!(report.files_removed, 1);
    }

    #[test]
    fn test_query_returns_a_packet() {
        let repo = tempfile::tempdir().expect("repo dir");
        write(repo.path(), "src/lib.rs", "pub fn hello() {}\n");

        let engine = test_engine(repo.path());
        engine.index(false).expect("index");

        let packet = engine.query("where is hello defined?").expect("query");
        assert_eq!(packet.schema_version, "1.0");
    }

    #[test]
    fn test_resolve_import_matches_suffix() {
        let mut map = BTreeMap::new();
        map.insert("src/auth/login".to_string(), "src/auth/login.py".to_string());
        assert_eq!(
            resolve_import("auth.login", &map),
            Some("src/auth/login.py".to_string())
        );
    }

    #[test]
    fn test_symbol_table_resolves_qualified_then_short_name() {
        let mut table = SymbolTable::default();
        table.insert("mod.hello", "hello", "uid1");
        assert_eq!(table.resolve("mod.hello"), Some("uid1".to_string()));
        assert_eq!(table.resolve("hello"), Some("uid1".to_string()));
        assert_eq!(table.resolve("nope"), None);
    }
}
