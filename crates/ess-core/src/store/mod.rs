//! SQLite-backed, project-scoped graph store (C5).
//!
//! One physical database serves every registered project; every table and
//! every query is scoped by a `project` column (I1). WAL mode is enabled so
//! read-heavy query traffic doesn't block the single ingestion writer.
//!
//! The atomic write path (spec.md §4.5) is realized with real
//! `BEGIN`/`COMMIT` transactions: [`GraphStore::ingest_file`] performs all
//! six steps -- upsert File node, upsert Code/Document/Chunk nodes, upsert
//! edges, delete stale nodes/edges for the path, update the FTS index -- as
//! one transaction, so a crash mid-ingestion never leaves the store with a
//! File node pointing at half-written chunks.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{EssError, EssResult};
use crate::ids::ProjectId;
use crate::types::{
    ChunkNode, ChunkStrategy, CodeEntity, DocumentNode, Edge, EdgeKind, FileCategory, FileNode,
    Language, Provenance,
};

/// The full, already-resolved set of writes for one file, handed to
/// [`GraphStore::ingest_file`] as a single atomic unit.
pub struct FileIngestion {
    /// The File node itself.
    pub file: FileNode,
    /// Code entities extracted from this file (empty for non-code files).
    pub code_entities: Vec<CodeEntity>,
    /// The Document node, if this file is prose rather than code.
    pub document: Option<DocumentNode>,
    /// Chunks produced by the chunker for this file.
    pub chunks: Vec<ChunkNode>,
    /// Edges with this file (or one of its entities) as the source.
    pub edges: Vec<Edge>,
}

/// SQLite-backed metadata and graph store.
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open or create a store database at the given path.
    pub fn open(db_path: &Path) -> EssResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> EssResult<()> {
        self.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    /// Run an integrity check on the database.
    pub fn check_integrity(&self) -> EssResult<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Get the raw connection for advanced / read-only queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // -- Project registry --------------------------------------------------

    /// Register a project (idempotent).
    pub fn register_project(&self, project: &ProjectId, root_dir: &str, registered_at: &str) -> EssResult<()> {
        self.conn.execute(
            "INSERT INTO projects (name, root_dir, registered_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET root_dir = excluded.root_dir",
            params![project.as_str(), root_dir, registered_at],
        )?;
        Ok(())
    }

    /// Whether a project has been registered.
    pub fn project_registered(&self, project: &ProjectId) -> EssResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE name = ?1",
            params![project.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All registered project names.
    pub fn list_projects(&self) -> EssResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM projects ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -- Atomic write path (spec.md §4.5) -----------------------------------

    /// Write everything derived from one file as a single transaction.
    ///
    /// Steps (spec.md §4.5): (1) upsert the File node, (2) upsert Code
    /// entities / the Document node, (3) upsert Chunks and their FTS rows,
    /// (4) upsert edges, (5) delete nodes/chunks/edges that existed for this
    /// path before this ingestion but were not re-emitted (stale entities,
    /// e.g. a deleted function), (6) commit. A failure at any step rolls
    /// back the whole file; ingestion continues with the next file (an
    /// `Integrity` fault is never allowed to corrupt a partially-written
    /// file's rows).
    pub fn ingest_file(&mut self, project: &ProjectId, ingestion: &FileIngestion) -> EssResult<()> {
        let tx = self.conn.transaction()?;

        let live_uids = Self::upsert_file_tx(&tx, project, ingestion)?;
        Self::prune_stale_tx(&tx, project, &ingestion.file.path, &live_uids, &ingestion.chunks)?;

        tx.commit()?;
        Ok(())
    }

    fn upsert_file_tx(
        tx: &rusqlite::Transaction<'_>,
        project: &ProjectId,
        ingestion: &FileIngestion,
    ) -> EssResult<Vec<String>> {
        let mut live_uids = vec![ingestion.file.uid.clone()];

        upsert_file_node_tx(tx, project, &ingestion.file)?;

        for entity in &ingestion.code_entities {
            upsert_code_entity_tx(tx, project, entity)?;
            live_uids.push(entity.uid.clone());
        }

        if let Some(doc) = &ingestion.document {
            upsert_document_node_tx(tx, project, doc)?;
            live_uids.push(doc.uid.clone());
        }

        for chunk in &ingestion.chunks {
            upsert_chunk_tx(tx, project, chunk)?;
        }

        for edge in &ingestion.edges {
            if edge.project.as_str() != project.as_str() {
                return Err(EssError::Integrity {
                    message: format!(
                        "edge {}->{} belongs to project {} but was submitted under {}",
                        edge.source_uid,
                        edge.target_uid,
                        edge.project.as_str(),
                        project.as_str()
                    ),
                });
            }
            upsert_edge_tx(tx, edge)?;
        }

        Ok(live_uids)
    }

    fn prune_stale_tx(
        tx: &rusqlite::Transaction<'_>,
        project: &ProjectId,
        path: &str,
        live_uids: &[String],
        live_chunks: &[ChunkNode],
    ) -> EssResult<()> {
        let mut stmt = tx.prepare(
            "SELECT uid FROM nodes WHERE project = ?1 AND path = ?2 AND kind != 'file'",
        )?;
        let existing: Vec<String> = stmt
            .query_map(params![project.as_str(), path], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for uid in existing {
            if !live_uids.contains(&uid) {
                tx.execute(
                    "DELETE FROM nodes WHERE project = ?1 AND uid = ?2",
                    params![project.as_str(), uid],
                )?;
                tx.execute(
                    "DELETE FROM edges WHERE project = ?1 AND (source_uid = ?2 OR target_uid = ?2)",
                    params![project.as_str(), uid],
                )?;
            }
        }

        let live_chunk_ids: Vec<&str> = live_chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        let mut stmt = tx.prepare("SELECT chunk_id FROM chunks WHERE project = ?1 AND path = ?2")?;
        let existing_chunks: Vec<String> = stmt
            .query_map(params![project.as_str(), path], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for chunk_id in existing_chunks {
            if !live_chunk_ids.contains(&chunk_id.as_str()) {
                tx.execute(
                    "DELETE FROM chunks WHERE project = ?1 AND chunk_id = ?2",
                    params![project.as_str(), chunk_id],
                )?;
                tx.execute(
                    "DELETE FROM chunks_fts WHERE project = ?1 AND chunk_id = ?2",
                    params![project.as_str(), chunk_id],
                )?;
            }
        }

        Ok(())
    }

    /// Remove every node, chunk, and edge associated with `path` (a deleted file).
    pub fn delete_file(&mut self, project: &ProjectId, path: &str) -> EssResult<()> {
        let tx = self.conn.transaction()?;

        let mut stmt = tx.prepare("SELECT uid FROM nodes WHERE project = ?1 AND path = ?2")?;
        let uids: Vec<String> = stmt
            .query_map(params![project.as_str(), path], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for uid in &uids {
            tx.execute(
                "DELETE FROM edges WHERE project = ?1 AND (source_uid = ?2 OR target_uid = ?2)",
                params![project.as_str(), uid],
            )?;
        }
        tx.execute(
            "DELETE FROM nodes WHERE project = ?1 AND path = ?2",
            params![project.as_str(), path],
        )?;
        tx.execute(
            "DELETE FROM chunks_fts WHERE project = ?1 AND chunk_id IN (SELECT chunk_id FROM chunks WHERE project = ?1 AND path = ?2)",
            params![project.as_str(), path],
        )?;
        tx.execute(
            "DELETE FROM chunks WHERE project = ?1 AND path = ?2",
            params![project.as_str(), path],
        )?;

        tx.commit()?;
        Ok(())
    }

    // -- Change-detection lookups -------------------------------------------

    /// `prov_file_hash` currently stored for the File node at `path`, if any
    /// (used to skip re-parsing unchanged files).
    pub fn file_hash(&self, project: &ProjectId, path: &str) -> EssResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT file_hash FROM nodes WHERE project = ?1 AND path = ?2 AND kind = 'file'",
                params![project.as_str(), path],
                |row| row.get(0),
            )
            .optional()
            .map_err(EssError::from)
    }

    /// `content_hash` currently stored for the chunk at `(path, chunk_index)`,
    /// if any (I6: rechunk only when this differs from the freshly computed hash).
    pub fn chunk_content_hash(
        &self,
        project: &ProjectId,
        path: &str,
        chunk_index: usize,
    ) -> EssResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT content_hash FROM chunks WHERE project = ?1 AND path = ?2 AND chunk_index = ?3",
                params![project.as_str(), path, chunk_index as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(EssError::from)
    }

    // -- Reads used by the query engine / graph rebuild ----------------------

    /// All edges for a project, used to rebuild the in-memory [`crate::graph::DependencyGraph`].
    pub fn all_edges(&self, project: &ProjectId) -> EssResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_uid, target_uid, type, line FROM edges WHERE project = ?1",
        )?;
        let rows = stmt.query_map(params![project.as_str()], |row| {
            let kind_str: String = row.get(2)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                kind_str,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (source_uid, target_uid, kind_str, line) = row?;
            let kind = EdgeKind::from_str_opt(&kind_str).ok_or_else(|| EssError::Integrity {
                message: format!("unrecognized edge type in store: {kind_str}"),
            })?;
            edges.push(Edge {
                project: project.clone(),
                source_uid,
                target_uid,
                kind,
                line: line.map(|l| l as u32),
            });
        }
        Ok(edges)
    }

    /// Edges touching `path`, sorted `(path, source, target, type)` (I-sort).
    pub fn relationships_for_path(&self, project: &ProjectId, path: &str) -> EssResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.source_uid, e.target_uid, e.type, e.line
             FROM edges e
             JOIN nodes n ON n.project = e.project AND (n.uid = e.source_uid OR n.uid = e.target_uid)
             WHERE e.project = ?1 AND n.path = ?2
             ORDER BY e.source_uid, e.target_uid, e.type",
        )?;
        let rows = stmt.query_map(params![project.as_str(), path], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (source_uid, target_uid, kind_str, line) = row?;
            let kind = EdgeKind::from_str_opt(&kind_str).ok_or_else(|| EssError::Integrity {
                message: format!("unrecognized edge type in store: {kind_str}"),
            })?;
            edges.push(Edge {
                project: project.clone(),
                source_uid,
                target_uid,
                kind,
                line: line.map(|l| l as u32),
            });
        }
        Ok(edges)
    }

    /// Keyword search over chunk content via FTS5, ranked by bm25.
    pub fn keyword_search(
        &self,
        project: &ProjectId,
        query: &str,
        limit: usize,
    ) -> EssResult<Vec<(String, String, String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.chunk_id, c.path, snippet(chunks_fts, 2, '', '', '...', 16), bm25(chunks_fts)
             FROM chunks_fts f
             JOIN chunks c ON c.project = f.project AND c.chunk_id = f.chunk_id
             WHERE f.project = ?1 AND chunks_fts MATCH ?2
             ORDER BY bm25(chunks_fts)
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![project.as_str(), query, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fetch a chunk by id.
    pub fn get_chunk(&self, project: &ProjectId, chunk_id: &str) -> EssResult<Option<ChunkNode>> {
        self.conn
            .query_row(
                "SELECT chunk_id, path, chunk_index, strategy, char_start, char_end, content,
                        content_hash, token_count, weight, file_hash, extractor_version, indexed_at
                 FROM chunks WHERE project = ?1 AND chunk_id = ?2",
                params![project.as_str(), chunk_id],
                |row| Ok(row_to_chunk(project, row)?),
            )
            .optional()
            .map_err(EssError::from)
    }

    /// Fetch a Code entity by uid.
    pub fn get_code_entity(&self, project: &ProjectId, uid: &str) -> EssResult<Option<CodeEntity>> {
        self.conn
            .query_row(
                "SELECT uid, path, qualified_name, name, kind, visibility, line_start, line_end,
                        doc_comment, file_hash, text_hash, extractor_version, indexed_at
                 FROM nodes WHERE project = ?1 AND uid = ?2 AND kind = 'code_entity'",
                params![project.as_str(), uid],
                |row| Ok(row_to_code_entity(project, row)?),
            )
            .optional()
            .map_err(EssError::from)
    }

    /// Number of nodes of a given kind for a project.
    pub fn node_count(&self, project: &ProjectId) -> EssResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE project = ?1",
            params![project.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of edges for a project.
    pub fn edge_count(&self, project: &ProjectId) -> EssResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE project = ?1",
            params![project.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of chunks for a project.
    pub fn chunk_count(&self, project: &ProjectId) -> EssResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE project = ?1",
            params![project.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// All distinct file paths recorded for a project.
    pub fn all_paths(&self, project: &ProjectId) -> EssResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT path FROM nodes WHERE project = ?1 AND kind = 'file' ORDER BY path",
        )?;
        let rows = stmt.query_map(params![project.as_str()], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// `(path, language)` for every File node in a project, used by the
    /// agent-tool adapter's `get_component_map` to group files without
    /// re-walking the repo tree. `language` is `None` for non-code files.
    pub fn all_files(&self, project: &ProjectId) -> EssResult<Vec<(String, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, language FROM nodes WHERE project = ?1 AND kind = 'file' ORDER BY path",
        )?;
        let rows = stmt.query_map(params![project.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every Code entity in a project, used to rebuild the cross-file symbol
    /// table at the start of an indexing pass.
    pub fn all_code_entities(&self, project: &ProjectId) -> EssResult<Vec<CodeEntity>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, path, qualified_name, name, kind, visibility, line_start, line_end,
                    doc_comment, file_hash, text_hash, extractor_version, indexed_at
             FROM nodes WHERE project = ?1 AND kind = 'code_entity'",
        )?;
        let rows = stmt.query_map(params![project.as_str()], |row| row_to_code_entity(project, row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Chunk ids currently stored for `path`, used to diff against a fresh
    /// ingestion's chunk set so the vector store can drop the ones that no
    /// longer exist (the graph store prunes these itself in `ingest_file`).
    pub fn chunk_ids_for_path(&self, project: &ProjectId, path: &str) -> EssResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT chunk_id FROM chunks WHERE project = ?1 AND path = ?2")?;
        let rows = stmt.query_map(params![project.as_str(), path], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn language_to_str(lang: Language) -> &'static str {
    lang.as_str()
}

fn category_to_str(cat: FileCategory) -> &'static str {
    match cat {
        FileCategory::Code => "code",
        FileCategory::Document => "document",
        FileCategory::Config => "config",
        FileCategory::Asset => "asset",
    }
}

fn category_from_str(s: &str) -> FileCategory {
    match s {
        "code" => FileCategory::Code,
        "document" => FileCategory::Document,
        "config" => FileCategory::Config,
        _ => FileCategory::Asset,
    }
}

fn strategy_to_str(s: ChunkStrategy) -> &'static str {
    match s {
        ChunkStrategy::Code => "code",
        ChunkStrategy::Document => "document",
        ChunkStrategy::Config => "config",
    }
}

fn strategy_from_str(s: &str) -> ChunkStrategy {
    match s {
        "document" => ChunkStrategy::Document,
        "config" => ChunkStrategy::Config,
        _ => ChunkStrategy::Code,
    }
}

fn upsert_file_node_tx(tx: &rusqlite::Transaction<'_>, project: &ProjectId, file: &FileNode) -> EssResult<()> {
    tx.execute(
        "INSERT INTO nodes (project, uid, kind, path, qualified_name, name, language, category,
                             size_bytes, file_hash, text_hash, extractor_version, indexed_at)
         VALUES (?1, ?2, 'file', ?3, '', NULL, ?4, ?5, ?6, ?7, NULL, ?8, ?9)
         ON CONFLICT(project, uid) DO UPDATE SET
             language = excluded.language, category = excluded.category,
             size_bytes = excluded.size_bytes, file_hash = excluded.file_hash,
             extractor_version = excluded.extractor_version, indexed_at = excluded.indexed_at",
        params![
            project.as_str(),
            file.uid,
            file.path,
            language_to_str(file.language),
            category_to_str(file.category),
            file.size_bytes as i64,
            file.provenance.file_hash,
            file.provenance.extractor_version,
            file.provenance.indexed_at,
        ],
    )?;
    Ok(())
}

fn upsert_code_entity_tx(tx: &rusqlite::Transaction<'_>, project: &ProjectId, entity: &CodeEntity) -> EssResult<()> {
    tx.execute(
        "INSERT INTO nodes (project, uid, kind, path, qualified_name, name, visibility,
                             line_start, line_end, doc_comment, file_hash, text_hash,
                             extractor_version, indexed_at)
         VALUES (?1, ?2, 'code_entity', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(project, uid) DO UPDATE SET
             line_start = excluded.line_start, line_end = excluded.line_end,
             doc_comment = excluded.doc_comment, file_hash = excluded.file_hash,
             text_hash = excluded.text_hash, extractor_version = excluded.extractor_version,
             indexed_at = excluded.indexed_at",
        params![
            project.as_str(),
            entity.uid,
            entity.path,
            entity.qualified_name,
            entity.name,
            entity.visibility.as_str(),
            entity.line_start as i64,
            entity.line_end as i64,
            entity.doc_comment,
            entity.provenance.file_hash,
            entity.provenance.text_hash,
            entity.provenance.extractor_version,
            entity.provenance.indexed_at,
        ],
    )?;
    Ok(())
}

fn upsert_document_node_tx(tx: &rusqlite::Transaction<'_>, project: &ProjectId, doc: &DocumentNode) -> EssResult<()> {
    tx.execute(
        "INSERT INTO nodes (project, uid, kind, path, qualified_name, title, file_hash,
                             text_hash, extractor_version, indexed_at)
         VALUES (?1, ?2, 'document', ?3, '', ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(project, uid) DO UPDATE SET
             title = excluded.title, file_hash = excluded.file_hash,
             text_hash = excluded.text_hash, extractor_version = excluded.extractor_version,
             indexed_at = excluded.indexed_at",
        params![
            project.as_str(),
            doc.uid,
            doc.path,
            doc.title,
            doc.provenance.file_hash,
            doc.provenance.text_hash,
            doc.provenance.extractor_version,
            doc.provenance.indexed_at,
        ],
    )?;
    Ok(())
}

fn upsert_chunk_tx(tx: &rusqlite::Transaction<'_>, project: &ProjectId, chunk: &ChunkNode) -> EssResult<()> {
    tx.execute(
        "INSERT INTO chunks (project, chunk_id, path, chunk_index, strategy, char_start, char_end,
                              content, content_hash, token_count, weight, file_hash,
                              extractor_version, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(project, chunk_id) DO UPDATE SET
             content = excluded.content, content_hash = excluded.content_hash,
             char_start = excluded.char_start, char_end = excluded.char_end,
             token_count = excluded.token_count, weight = excluded.weight,
             file_hash = excluded.file_hash, extractor_version = excluded.extractor_version,
             indexed_at = excluded.indexed_at",
        params![
            project.as_str(),
            chunk.chunk_id,
            chunk.path,
            chunk.chunk_index as i64,
            strategy_to_str(chunk.strategy),
            chunk.char_start as i64,
            chunk.char_end as i64,
            chunk.content,
            chunk.content_hash,
            chunk.token_count as i64,
            chunk.weight,
            chunk.provenance.file_hash,
            chunk.provenance.extractor_version,
            chunk.provenance.indexed_at,
        ],
    )?;

    tx.execute(
        "DELETE FROM chunks_fts WHERE project = ?1 AND chunk_id = ?2",
        params![project.as_str(), chunk.chunk_id],
    )?;
    tx.execute(
        "INSERT INTO chunks_fts (project, chunk_id, content) VALUES (?1, ?2, ?3)",
        params![project.as_str(), chunk.chunk_id, chunk.content],
    )?;
    Ok(())
}

fn upsert_edge_tx(tx: &rusqlite::Transaction<'_>, edge: &Edge) -> EssResult<()> {
    tx.execute(
        "INSERT INTO edges (project, source_uid, target_uid, type, line)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(project, source_uid, target_uid, type) DO UPDATE SET line = excluded.line",
        params![
            edge.project.as_str(),
            edge.source_uid,
            edge.target_uid,
            edge.kind.as_str(),
            edge.line,
        ],
    )?;
    Ok(())
}

fn row_to_chunk(project: &ProjectId, row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkNode> {
    Ok(ChunkNode {
        project: project.clone(),
        chunk_id: row.get(0)?,
        path: row.get(1)?,
        chunk_index: row.get::<_, i64>(2)? as usize,
        strategy: strategy_from_str(&row.get::<_, String>(3)?),
        char_start: row.get::<_, i64>(4)? as usize,
        char_end: row.get::<_, i64>(5)? as usize,
        content: row.get(6)?,
        content_hash: row.get(7)?,
        token_count: row.get::<_, i64>(8)? as u32,
        weight: row.get(9)?,
        provenance: Provenance {
            file_hash: row.get(10)?,
            text_hash: None,
            extractor_version: row.get(11)?,
            indexed_at: row.get(12)?,
        },
    })
}

fn row_to_code_entity(project: &ProjectId, row: &rusqlite::Row<'_>) -> rusqlite::Result<CodeEntity> {
    use crate::types::{ChunkKind, Visibility};
    Ok(CodeEntity {
        project: project.clone(),
        uid: row.get(0)?,
        path: row.get(1)?,
        qualified_name: row.get(2)?,
        name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        kind: ChunkKind::TopLevel,
        visibility: Visibility::from_str_lossy(&row.get::<_, String>(5)?),
        line_start: row.get::<_, i64>(6)? as u32,
        line_end: row.get::<_, i64>(7)? as u32,
        doc_comment: row.get(8)?,
        provenance: Provenance {
            file_hash: row.get(9)?,
            text_hash: row.get(10)?,
            extractor_version: row.get(11)?,
            indexed_at: row.get(12)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids;

    fn sample_project() -> ProjectId {
        ProjectId::new("demo").unwrap()
    }

    fn sample_ingestion(project: &ProjectId) -> FileIngestion {
        let path = "src/lib.rs";
        let uid = ids::node_uid(project.as_str(), path, "");
        let file = FileNode {
            project: project.clone(),
            uid,
            path: path.into(),
            language: Language::Rust,
            size_bytes: 42,
            category: FileCategory::Code,
            provenance: Provenance {
                file_hash: "filehash".into(),
                text_hash: None,
                extractor_version: "1".into(),
                indexed_at: "2026-01-01T00:00:00Z".into(),
            },
        };
        FileIngestion {
            file,
            code_entities: Vec::new(),
            document: None,
            chunks: Vec::new(),
            edges: Vec::new(),
        }
    }

    #[test]
    fn test_open_creates_database() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = GraphStore::open(&dir.path().join("test.db")).expect("open database");
        assert!(store.check_integrity().expect("check integrity"));
    }

    #[test]
    fn test_ingest_file_and_read_back() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = GraphStore::open(&dir.path().join("test.db")).expect("open database");
        let project = sample_project();
        let ingestion = sample_ingestion(&project);

        store.ingest_file(&project, &ingestion).expect("ingest");
        assert_eq!(store.node_count(&project).expect("count"), 1);
        assert_eq!(
            store.file_hash(&project, "src/lib.rs").expect("hash").as_deref(),
            Some("filehash")
        );
    }

    #[test]
    fn test_delete_file_removes_everything() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = GraphStore::open(&dir.path().join("test.db")).expect("open database");
        let project = sample_project();
        let ingestion = sample_ingestion(&project);
        store.ingest_file(&project, &ingestion).expect("ingest");

        store.delete_file(&project, "src/lib.rs").expect("delete");
        assert_eq!(store.node_count(&project).expect("count"), 0);
    }

    #[test]
    fn test_projects_are_isolated() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = GraphStore::open(&dir.path().join("test.db")).expect("open database");
        let a = ProjectId::new("proj-a").unwrap();
        let b = ProjectId::new("proj-b").unwrap();

        store.ingest_file(&a, &sample_ingestion(&a)).expect("ingest a");
        assert_eq!(store.node_count(&b).expect("count b"), 0);
        assert_eq!(store.node_count(&a).expect("count a"), 1);
    }
}
