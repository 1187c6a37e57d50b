//! Core domain types shared across all ess-core subsystems.
//!
//! These types form the API contract between modules. Changing them
//! requires updating all consumers, so they should be stable and minimal.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ids::ProjectId;

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Supported programming languages and document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python (.py)
    Python,
    /// TypeScript (.ts, .tsx)
    TypeScript,
    /// JavaScript (.js, .jsx)
    JavaScript,
    /// Rust (.rs)
    Rust,
    /// Go (.go)
    Go,
    /// Java (.java)
    Java,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .cc, .cxx, .hpp, .hxx)
    Cpp,
    /// C# (.cs)
    CSharp,
    /// CSS / SCSS (.css, .scss)
    Css,
    /// Ruby (.rb)
    Ruby,
    /// PHP (.php)
    Php,
    /// Swift (.swift)
    Swift,
    /// Kotlin (.kt, .kts)
    Kotlin,
    /// HTML (.html, .htm)
    Html,
    /// Shell / Bash (.sh, .bash, .zsh)
    Shell,
    /// Markdown (.md, .mdx)
    Markdown,
    /// TOML configuration (.toml)
    Toml,
    /// YAML configuration (.yml, .yaml)
    Yaml,
    /// JSON data (.json, .jsonc)
    Json,
    /// Unknown / unsupported
    Unknown,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" => Self::Python,
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "css" | "scss" => Self::Css,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "html" | "htm" => Self::Html,
            "sh" | "bash" | "zsh" => Self::Shell,
            "md" | "mdx" => Self::Markdown,
            "toml" => Self::Toml,
            "yml" | "yaml" => Self::Yaml,
            "json" | "jsonc" => Self::Json,
            _ => Self::Unknown,
        }
    }

    /// Returns the language identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Css => "css",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Html => "html",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if this is an AST-parseable programming language.
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Self::Python
                | Self::TypeScript
                | Self::JavaScript
                | Self::Rust
                | Self::Go
                | Self::Java
                | Self::C
                | Self::Cpp
                | Self::CSharp
                | Self::Css
                | Self::Ruby
                | Self::Php
                | Self::Swift
                | Self::Kotlin
        )
    }

    /// Returns true if this is a documentation or config format.
    pub fn is_document(&self) -> bool {
        matches!(
            self,
            Self::Markdown | Self::Toml | Self::Yaml | Self::Json | Self::Html | Self::Shell
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parser-internal chunk shape (pre-uid-stamping)
// ---------------------------------------------------------------------------

/// The kind of code construct a chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Function or method definition.
    Function,
    /// Class, struct, or record definition.
    Class,
    /// Trait, interface, or protocol definition.
    Trait,
    /// Implementation block (Rust `impl`, Java anonymous class, etc.).
    Impl,
    /// Constant or static variable.
    Const,
    /// Type alias or definition.
    TypeDef,
    /// Module or namespace declaration.
    Module,
    /// Test function or test block.
    Test,
    /// Top-level statements that don't fit other categories.
    TopLevel,
}

impl ChunkKind {
    /// Returns the default structural importance weight for this kind.
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::Function => 0.85,
            Self::Class => 0.95,
            Self::Trait => 0.95,
            Self::Impl => 0.85,
            Self::Const => 0.70,
            Self::TypeDef => 0.90,
            Self::Module => 0.60,
            Self::Test => 0.60,
            Self::TopLevel => 0.50,
        }
    }

    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Trait => "trait",
            Self::Impl => "impl",
            Self::Const => "const",
            Self::TypeDef => "typedef",
            Self::Module => "module",
            Self::Test => "test",
            Self::TopLevel => "top_level",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "class" => Self::Class,
            "trait" => Self::Trait,
            "impl" => Self::Impl,
            "const" => Self::Const,
            "typedef" => Self::TypeDef,
            "module" => Self::Module,
            "test" => Self::Test,
            _ => Self::TopLevel,
        }
    }
}

/// Visibility of a code symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Accessible from outside the module/crate.
    Public,
    /// Accessible only within the current crate/package.
    Crate,
    /// Accessible from parent class or subclasses.
    Protected,
    /// Accessible only within the defining scope.
    Private,
}

impl Visibility {
    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Crate => "crate",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }

    /// Parse from database string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            "crate" => Self::Crate,
            "protected" => Self::Protected,
            "private" => Self::Private,
            _ => Self::Private,
        }
    }

    /// Returns a weight multiplier for public vs private apis.
    pub fn weight_multiplier(&self) -> f64 {
        match self {
            Self::Public => 1.0,
            Self::Crate => 0.9,
            Self::Protected => 0.85,
            Self::Private => 0.70,
        }
    }
}

/// An import statement extracted from source code, prior to resolution.
///
/// Used for dependency graph construction. Each import is later folded into
/// the closed [`EdgeKind`] set (almost always `Imports` or `DependsOn`) when
/// the pipeline writes edges to the graph store.
#[derive(Debug, Clone)]
pub struct ImportStatement {
    /// The raw import path (e.g., "os.path", "crate::config", "./utils").
    pub import_path: String,
    /// Optional specific names imported (e.g., ["Config", "load"]).
    pub imported_names: Vec<String>,
    /// Line number where the import appears.
    pub line: u32,
    /// Parser-internal relationship hint; mapped to a closed `EdgeKind` at
    /// the write boundary (see `pipeline::map_dependency_kind`).
    pub kind: DependencyKind,
}

/// Parser-internal dependency relationship hint.
///
/// This is an open set so that per-language analyzers can be precise about
/// what they observed; it is never persisted directly. `pipeline` folds it
/// down to the closed `EdgeKind` set (spec.md §3) before writing an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// File/module A imports module B.
    Imports,
    /// Function A calls function B.
    Calls,
    /// Class A extends/inherits from class B.
    Extends,
    /// Struct/class A implements trait/interface B.
    Implements,
    /// Function A uses type B as parameter or return type.
    UsesType,
    /// Function A creates an instance of struct/class B.
    Instantiates,
    /// Function A accesses a field of struct B.
    FieldAccess,
}

// ---------------------------------------------------------------------------
// Closed graph data model (spec.md §3)
// ---------------------------------------------------------------------------

/// The closed set of edge types the graph store will persist (I1).
///
/// Any relationship a language analyzer detects that doesn't map onto one of
/// these is dropped at the write boundary rather than inventing a new type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// A File or Code entity defines a Code entity (e.g. module defines function).
    Defines,
    /// A Code entity calls another Code entity.
    Calls,
    /// A File imports another File or external module.
    Imports,
    /// A generic structural/semantic dependency not captured by a more
    /// specific kind (extends, implements, uses-type, instantiates, etc.
    /// all fold into this).
    DependsOn,
    /// A File node owns a non-code asset (image, data file).
    HasAsset,
    /// A File or Document node owns a Chunk.
    HasChunk,
    /// A Document mentions a Code entity or File by name.
    Mentions,
    /// Two Files tend to change together (derived from commit history).
    /// Optional: only emitted when commit-history mining is enabled.
    CoChangesWith,
}

impl EdgeKind {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Defines => "DEFINES",
            Self::Calls => "CALLS",
            Self::Imports => "IMPORTS",
            Self::DependsOn => "DEPENDS_ON",
            Self::HasAsset => "HAS_ASSET",
            Self::HasChunk => "HAS_CHUNK",
            Self::Mentions => "MENTIONS",
            Self::CoChangesWith => "CO_CHANGES_WITH",
        }
    }

    /// Parse from database string; unknown strings are rejected by callers
    /// (an unrecognized edge type is an `Integrity` fault, not a fallback).
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "DEFINES" => Self::Defines,
            "CALLS" => Self::Calls,
            "IMPORTS" => Self::Imports,
            "DEPENDS_ON" => Self::DependsOn,
            "HAS_ASSET" => Self::HasAsset,
            "HAS_CHUNK" => Self::HasChunk,
            "MENTIONS" => Self::Mentions,
            "CO_CHANGES_WITH" => Self::CoChangesWith,
            _ => return None,
        })
    }
}

/// The kind of node stored in the graph (discriminates the `nodes` table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source, config, or asset file.
    File,
    /// A function, class, trait, or other parsed code construct.
    CodeEntity,
    /// A chunk of text produced by the chunker (code or document).
    Chunk,
    /// A non-code document (README, markdown notes, etc.).
    Document,
}

/// Provenance metadata carried by every node (I4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// SHA-1 of the raw file bytes this node was derived from.
    pub file_hash: String,
    /// SHA-256 of the CRLF-normalized text content (chunk/document nodes only).
    pub text_hash: Option<String>,
    /// Extractor version string stamped at write time (`Config::extractor_version`).
    pub extractor_version: String,
    /// ISO-8601 timestamp of the write that produced/last-touched this node.
    pub indexed_at: String,
}

/// A File node: one row per discovered, classified file (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    /// Owning project.
    pub project: ProjectId,
    /// Content-deterministic id (`ids::node_uid(project, path, "")`).
    pub uid: String,
    /// Path relative to the repository root.
    pub path: String,
    /// Detected language/format.
    pub language: Language,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Whether this file is code, document, or other (drives chunking strategy).
    pub category: FileCategory,
    /// Provenance.
    pub provenance: Provenance,
}

/// Coarse file classification (C1), independent of `Language`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    /// AST-parseable source code.
    Code,
    /// Natural-language documentation.
    Document,
    /// Structured configuration (TOML/YAML/JSON).
    Config,
    /// Anything else that still warrants a File node but no content parsing
    /// (binary assets, images, lockfiles).
    Asset,
}

/// A Code entity node: a function, class, trait, etc. extracted by a
/// language analyzer (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEntity {
    /// Owning project.
    pub project: ProjectId,
    /// Content-deterministic id.
    pub uid: String,
    /// File this entity is defined in (path relative to repo root).
    pub path: String,
    /// Fully qualified name (module path + symbol name).
    pub qualified_name: String,
    /// Short (unqualified) name.
    pub name: String,
    /// What kind of construct this is.
    pub kind: ChunkKind,
    /// Visibility.
    pub visibility: Visibility,
    /// 1-indexed start line.
    pub line_start: u32,
    /// 1-indexed end line, inclusive.
    pub line_end: u32,
    /// Extracted doc comment, if any.
    pub doc_comment: Option<String>,
    /// Provenance.
    pub provenance: Provenance,
}

/// A Chunk node: a retrievable unit of text produced by the chunker (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkNode {
    /// Owning project.
    pub project: ProjectId,
    /// `ids::chunk_id(project, path, chunk_index, content_hash)`.
    pub chunk_id: String,
    /// File (or document) this chunk was extracted from.
    pub path: String,
    /// 0-indexed position of this chunk within its file.
    pub chunk_index: usize,
    /// Chunking strategy that produced this chunk.
    pub strategy: ChunkStrategy,
    /// Character offset of the chunk start within the normalized file text.
    pub char_start: usize,
    /// Character offset of the chunk end (exclusive).
    pub char_end: usize,
    /// The chunk's text content.
    pub content: String,
    /// SHA-256 of the normalized chunk content (`content_hash`); rechunking
    /// is skipped when this is unchanged from the prior run (I6).
    pub content_hash: String,
    /// Estimated token count.
    pub token_count: u32,
    /// Structural importance weight in `[0.0, 1.0]`.
    pub weight: f64,
    /// Provenance.
    pub provenance: Provenance,
}

/// Chunking strategy used to produce a [`ChunkNode`] (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Whole-construct or line/signature-aware split over parsed code.
    Code,
    /// Paragraph-respecting split over prose documents.
    Document,
    /// Fixed-size split with generous overlap over structured config.
    Config,
}

/// A Document node: a non-code file indexed as prose (C2/C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentNode {
    /// Owning project.
    pub project: ProjectId,
    /// Content-deterministic id.
    pub uid: String,
    /// Path relative to the repository root.
    pub path: String,
    /// Document title, if one could be extracted (e.g. a Markdown H1).
    pub title: Option<String>,
    /// Provenance.
    pub provenance: Provenance,
}

/// A directed edge in the graph store, scoped to a single project (I1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Owning project. Both endpoints must belong to the same project.
    pub project: ProjectId,
    /// uid of the source node.
    pub source_uid: String,
    /// uid of the target node.
    pub target_uid: String,
    /// Edge type, drawn from the closed [`EdgeKind`] set.
    pub kind: EdgeKind,
    /// Optional 1-indexed line the relationship was observed at.
    pub line: Option<u32>,
}

// ---------------------------------------------------------------------------
// Pipeline events
// ---------------------------------------------------------------------------

/// Events flowing through the indexing pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A file was created or modified and needs (re-)indexing.
    FileChanged {
        /// Path relative to the repository root.
        path: PathBuf,
    },
    /// A file was deleted and should be removed from the index.
    FileDeleted {
        /// Path relative to the repository root.
        path: PathBuf,
    },
    /// A full repository scan is requested.
    FullScan,
    /// Shutdown the pipeline gracefully.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Veracity (C8)
// ---------------------------------------------------------------------------

/// One deduction applied while scoring an evidence packet (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fault {
    /// A cited document's mtime predates the code it describes.
    StaleDoc,
    /// A cited node has no incoming or outgoing edges.
    OrphanedNode,
    /// Two cited sources assert incompatible facts.
    Contradiction,
    /// Fewer than the expected number of independent sources support a claim.
    LowCoverage,
    /// A matched Code node has no current embedding.
    EmbeddingMissing,
}

impl Fault {
    /// Point penalty applied for one occurrence of this fault (spec.md §4.8).
    pub fn penalty(&self) -> i32 {
        match self {
            Self::StaleDoc => 15,
            Self::OrphanedNode => 5,
            Self::Contradiction => 20,
            Self::LowCoverage => 10,
            Self::EmbeddingMissing => 10,
        }
    }
}

/// The result of scoring a [`QueryResponse`]'s evidence packet (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeracityReport {
    /// Final score, floored at 0, ceiled at 100.
    pub score: u8,
    /// Every fault detected, in the order it was applied.
    pub faults: Vec<Fault>,
}

// ---------------------------------------------------------------------------
// Query / evidence packet (C7), schema v1.0
// ---------------------------------------------------------------------------

/// A natural-language query against a single project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Project the query is scoped to.
    pub project: String,
    /// Free-text query.
    pub query: String,
    /// Optional prior turns, for conversational ambiguity resolution (C10).
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Overall response completeness (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Both backends answered.
    Success,
    /// One backend answered, the other is unavailable.
    Partial,
    /// Neither backend answered within budget.
    Unavailable,
}

/// A semantic (vector) search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMatch {
    /// uid of the matched Code/Document/Chunk node.
    pub uid: String,
    /// Path the match belongs to.
    pub path: String,
    /// 1-indexed line range, if applicable.
    pub line_start: Option<u32>,
    /// 1-indexed line range, if applicable.
    pub line_end: Option<u32>,
    /// Cosine similarity score in `[-1.0, 1.0]`.
    pub score: f64,
    /// Matched text excerpt.
    pub excerpt: String,
}

/// A structural (graph) search hit describing one edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralRelationship {
    /// Path owning the source node.
    pub path: String,
    /// uid of the source node.
    pub source: String,
    /// uid of the target node.
    pub target: String,
    /// Edge type.
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// Free-form summary text synthesized from the evidence, always citation-backed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Insights {
    /// One-paragraph synthesized answer. Empty when there is no supporting evidence.
    pub summary: String,
    /// uids of every node cited in `summary`.
    pub cited_uids: Vec<String>,
}

/// Size accounting for a response, used to decide streaming (spec.md §4.6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResultSize {
    /// Serialized response size in bytes.
    pub total_bytes: usize,
    /// Number of semantic matches in the packet.
    pub semantic_matches: usize,
    /// Number of structural relationships in the packet.
    pub structural_relationships: usize,
    /// Whether the response was streamed rather than returned whole.
    pub compressed: bool,
}

/// Semantic (vector) half of a [`QueryResults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticResults {
    /// Human-readable summary of this backend's contribution (may note
    /// unavailability or a timeout).
    pub summary: String,
    /// Hits, sorted `(score DESC, path ASC, uid ASC)`.
    pub matches: Vec<SemanticMatch>,
}

/// Structural (graph) half of a [`QueryResults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralResults {
    /// Human-readable summary of this backend's contribution (may note
    /// unavailability or a timeout).
    pub summary: String,
    /// Hits, sorted `(path, source, target, type)`.
    pub relationships: Vec<StructuralRelationship>,
}

/// The `results` object of a [`QueryResponse`] (spec.md §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResults {
    /// Everything the vector backend contributed.
    pub semantic: SemanticResults,
    /// Everything the graph backend contributed.
    pub structural: StructuralResults,
    /// Synthesized, citation-backed summary, when any evidence supports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Insights>,
}

/// Metadata describing how a [`QueryResponse`] was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Whether the graph backend was actually consulted.
    pub graph_queried: bool,
    /// Whether the vector backend was actually consulted.
    pub vector_queried: bool,
    /// Graph backend latency, milliseconds.
    pub graph_latency_ms: u64,
    /// Vector backend latency, milliseconds.
    pub vector_latency_ms: u64,
    /// Total wall-clock time for the query, milliseconds.
    pub total_latency_ms: u64,
    /// Whether this response was served from a cache.
    pub cache_hit: bool,
    /// Size accounting.
    pub result_size: ResultSize,
    /// Intent classifier confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Whether the intent classifier flagged this query as ambiguous.
    pub ambiguous: bool,
}

/// The full evidence packet returned by the query engine (C7), schema v1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Evidence packet schema version, currently `"1.0"`.
    pub schema_version: String,
    /// Identifier correlating this response to its request and audit entry.
    pub request_id: String,
    /// Overall completeness.
    pub status: ResponseStatus,
    /// RFC 3339 timestamp at which the packet was produced.
    pub timestamp: String,
    /// Classified intent (`code`, `explanation`, `location`, `relationship`,
    /// `both`, `unknown`).
    pub query_type: String,
    /// Evidence returned by each backend.
    pub results: QueryResults,
    /// Non-fatal notices, e.g. a single backend being unavailable under
    /// `status: partial`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    /// Set to [`QueryResponse::UNAVAILABLE_MESSAGE`] when `status` is
    /// [`ResponseStatus::Unavailable`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_message: Option<String>,
    /// Query metadata.
    pub meta: ResponseMeta,
    /// Veracity score for this packet.
    pub veracity: VeracityReport,
}

impl QueryResponse {
    /// The literal fallback message emitted when both backends are
    /// unavailable (spec.md §4.6).
    pub const UNAVAILABLE_MESSAGE: &'static str =
        "SYSTEM IS UNAVAILABLE, USE WEB & CODEBASE RESEARCH";
}

/// A conversational ambiguity-gate response asking the caller to answer
/// `questions` before the query can be resolved into a [`QueryResponse`]
/// (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationResponse {
    /// Evidence packet schema version, currently `"1.0"`.
    pub schema_version: String,
    /// Identifier correlating this response to its request.
    pub request_id: String,
    /// Always `"conversation"`, distinguishing this from a resolved packet
    /// when deserialized generically.
    #[serde(rename = "type")]
    pub response_type: String,
    /// RFC 3339 timestamp at which the packet was produced.
    pub timestamp: String,
    /// Conversation this turn belongs to.
    pub conversation_id: String,
    /// Clarification round, starting at 1.
    pub round: u32,
    /// Questions the caller must answer to disambiguate the query.
    pub questions: Vec<String>,
}

impl ClarificationResponse {
    pub const RESPONSE_TYPE: &'static str = "conversation";
}

/// Either half of a conversational query turn: a clarification request, or
/// the resolved evidence packet once the conversation is no longer ambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineResponse {
    Clarification(ClarificationResponse),
    Packet(Box<QueryResponse>),
}

impl EngineResponse {
    /// The resolved packet, if this turn did not require clarification.
    pub fn packet(&self) -> Option<&QueryResponse> {
        match self {
            Self::Packet(p) => Some(p),
            Self::Clarification(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Component map (agent-tool adapter `get_component_map`, spec.md §6)
// ---------------------------------------------------------------------------

/// One top-level component (directory) summarized for the `get_component_map`
/// tool: a coarse-grained view of the repository's shape without walking the
/// full file list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentMapEntry {
    /// Top-level path segment (e.g. `src`, `tests`), or `"."` for root files.
    pub component: String,
    /// Files discovered under this component.
    pub file_count: usize,
    /// Code entities (functions/classes/etc.) defined under this component.
    pub code_entity_count: usize,
    /// Languages observed under this component, most common first.
    pub languages: Vec<String>,
}

/// The full component map for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentMap {
    /// Project this map describes.
    pub project: String,
    /// Components, sorted by path.
    pub components: Vec<ComponentMapEntry>,
    /// Total files across every component.
    pub total_files: usize,
    /// Total code entities across every component.
    pub total_code_entities: usize,
}
