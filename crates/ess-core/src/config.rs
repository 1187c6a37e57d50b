//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins),
//! per the design notes in spec.md §9:
//!
//! 1. CLI flags (applied by callers via [`Config::apply_overrides`])
//! 2. Environment variables (`VERACITY_*`)
//! 3. Project config (`<repo>/.ess/config.toml`)
//! 4. User config (`~/.config/ess/config.toml`)
//! 5. Compiled-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EssError, EssResult};

/// Top-level configuration for the Engineering Support System core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository root path to index.
    pub repo_path: PathBuf,

    /// Indexing configuration.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Graph store configuration.
    #[serde(default)]
    pub graph: GraphConfig,

    /// Vector store configuration.
    #[serde(default)]
    pub vector: VectorConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Circuit breaker configuration.
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// HTTP/API server configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// Extractor provenance version, stamped onto every node written during
    /// this process's lifetime. Bumping it forces downstream consumers to
    /// treat existing nodes as produced by an older extractor.
    #[serde(default = "Config::default_extractor_version")]
    pub extractor_version: String,
}

/// Indexing-specific settings (C1-C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File/directory patterns to exclude from discovery (glob syntax),
    /// beyond the fixed security exclusion list (§4.1).
    #[serde(default = "IndexingConfig::default_excludes")]
    pub exclude_patterns: Vec<String>,

    /// Maximum file size to index (in bytes). Files larger than this are
    /// skipped but still produce a metadata-only File node.
    #[serde(default = "IndexingConfig::default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of concurrent parse tasks.
    #[serde(default = "IndexingConfig::default_parse_concurrency")]
    pub parse_concurrency: usize,

    /// Target chunk size in tokens.
    #[serde(default = "IndexingConfig::default_chunk_size_tokens")]
    pub chunk_size_tokens: u32,

    /// Whether to follow symbolic links during discovery.
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Self::default_excludes(),
            max_file_size: Self::default_max_file_size(),
            parse_concurrency: Self::default_parse_concurrency(),
            chunk_size_tokens: Self::default_chunk_size_tokens(),
            follow_symlinks: false,
        }
    }
}

impl IndexingConfig {
    fn default_excludes() -> Vec<String> {
        vec![
            "node_modules".into(),
            "target".into(),
            "__pycache__".into(),
            ".venv".into(),
            "venv".into(),
            "dist".into(),
            "build".into(),
            ".next".into(),
            "*.lock".into(),
            "*.min.js".into(),
            "*.min.css".into(),
            "*.map".into(),
        ]
    }

    fn default_max_file_size() -> u64 {
        5 * 1024 * 1024
    }

    fn default_parse_concurrency() -> usize {
        4
    }

    fn default_chunk_size_tokens() -> u32 {
        512
    }
}

/// Search-specific settings (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// RRF constant (k parameter).
    #[serde(default = "SearchConfig::default_rrf_k")]
    pub rrf_k: u32,

    /// Per-backend semantic search timeout, milliseconds.
    #[serde(default = "SearchConfig::default_semantic_timeout_ms")]
    pub semantic_timeout_ms: u64,

    /// Per-backend structural search timeout, milliseconds.
    #[serde(default = "SearchConfig::default_structural_timeout_ms")]
    pub structural_timeout_ms: u64,

    /// Overall query wall-clock deadline, milliseconds.
    #[serde(default = "SearchConfig::default_total_deadline_ms")]
    pub total_deadline_ms: u64,

    /// Size above which a response is streamed rather than returned whole.
    #[serde(default = "SearchConfig::default_stream_threshold_bytes")]
    pub stream_threshold_bytes: usize,

    /// Hard ceiling on total response size.
    #[serde(default = "SearchConfig::default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: Self::default_rrf_k(),
            semantic_timeout_ms: Self::default_semantic_timeout_ms(),
            structural_timeout_ms: Self::default_structural_timeout_ms(),
            total_deadline_ms: Self::default_total_deadline_ms(),
            stream_threshold_bytes: Self::default_stream_threshold_bytes(),
            max_response_bytes: Self::default_max_response_bytes(),
        }
    }
}

impl SearchConfig {
    fn default_rrf_k() -> u32 {
        60
    }
    fn default_semantic_timeout_ms() -> u64 {
        800
    }
    fn default_structural_timeout_ms() -> u64 {
        800
    }
    fn default_total_deadline_ms() -> u64 {
        1500
    }
    fn default_stream_threshold_bytes() -> usize {
        100 * 1024
    }
    fn default_max_response_bytes() -> usize {
        10 * 1024 * 1024
    }
}

/// Graph store configuration (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Connection URI. Defaults to a project-scoped SQLite file under the
    /// data directory; can be overridden to point at a shared instance.
    #[serde(default)]
    pub uri: Option<String>,
    /// Optional auth user for a non-embedded backend.
    #[serde(default)]
    pub user: Option<String>,
    /// Optional auth password for a non-embedded backend.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: None,
            user: None,
            password: None,
        }
    }
}

/// Vector store configuration (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Connection URL. Defaults to a project-scoped flat file under the
    /// data directory.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { url: None }
    }
}

/// Embedding model configuration (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Remote embedding endpoint; `None` selects the local ONNX runtime.
    #[serde(default)]
    pub url: Option<String>,

    /// Model identifier/version. Pinned; a version change forces a full
    /// re-embed of every project.
    #[serde(default = "EmbeddingConfig::default_model")]
    pub model: String,

    /// Output embedding dimensions.
    #[serde(default = "EmbeddingConfig::default_dims")]
    pub dims: usize,

    /// Reproducibility seed passed to the backend where supported.
    #[serde(default = "EmbeddingConfig::default_seed")]
    pub seed: u64,

    /// Batch size for embedding inference.
    #[serde(default = "EmbeddingConfig::default_batch_size")]
    pub batch_size: usize,

    /// Maximum sequence length for the tokenizer.
    #[serde(default = "EmbeddingConfig::default_max_seq_length")]
    pub max_seq_length: usize,

    /// Per-batch timeout, milliseconds.
    #[serde(default = "EmbeddingConfig::default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Path to the local ONNX model file (used when `url` is `None`).
    #[serde(default = "EmbeddingConfig::default_model_path")]
    pub model_path: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: Self::default_model(),
            dims: Self::default_dims(),
            seed: Self::default_seed(),
            batch_size: Self::default_batch_size(),
            max_seq_length: Self::default_max_seq_length(),
            batch_timeout_ms: Self::default_batch_timeout_ms(),
            model_path: Self::default_model_path(),
        }
    }
}

impl EmbeddingConfig {
    fn default_model_path() -> PathBuf {
        crate::embedder::model_manager::model_path(&crate::embedder::model_manager::DEFAULT_MODEL)
    }
    fn default_model() -> String {
        crate::embedder::model_manager::DEFAULT_MODEL.name.to_string()
    }
    fn default_dims() -> usize {
        768
    }
    fn default_seed() -> u64 {
        42
    }
    fn default_batch_size() -> usize {
        32
    }
    fn default_max_seq_length() -> usize {
        512
    }
    fn default_batch_timeout_ms() -> u64 {
        30_000
    }
}

/// File watcher configuration (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce interval in seconds.
    #[serde(default = "WatcherConfig::default_debounce_seconds")]
    pub debounce_seconds: u64,

    /// Interval between full scans (in seconds) for catching missed events
    /// in `polling` watch mode.
    #[serde(default = "WatcherConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// High-water mark on the embedding queue before discovery pauses new
    /// work and the watcher starts debouncing further events (§5 backpressure).
    #[serde(default = "WatcherConfig::default_embed_queue_high_water_mark")]
    pub embed_queue_high_water_mark: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: Self::default_debounce_seconds(),
            poll_interval_secs: Self::default_poll_interval_secs(),
            embed_queue_high_water_mark: Self::default_embed_queue_high_water_mark(),
        }
    }
}

impl WatcherConfig {
    fn default_debounce_seconds() -> u64 {
        2
    }
    fn default_poll_interval_secs() -> u64 {
        300
    }
    fn default_embed_queue_high_water_mark() -> usize {
        512
    }
}

/// Circuit breaker configuration (C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "CircuitConfig::default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before moving to half-open.
    #[serde(default = "CircuitConfig::default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
    /// Consecutive successes in half-open required to close the circuit.
    #[serde(default = "CircuitConfig::default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            reset_timeout_secs: Self::default_reset_timeout_secs(),
            success_threshold: Self::default_success_threshold(),
        }
    }
}

impl CircuitConfig {
    fn default_failure_threshold() -> u32 {
        5
    }
    fn default_reset_timeout_secs() -> u64 {
        30
    }
    fn default_success_threshold() -> u32 {
        3
    }
}

/// HTTP/API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bearer token required on `/query`. `None` disables auth (local/dev only).
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Per-project token-bucket rate limit: requests per minute. `None` disables it.
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: None,
            rate_limit_per_minute: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Whether to output logs as JSON.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

impl Config {
    fn default_extractor_version() -> String {
        "1".into()
    }

    /// Load configuration from defaults, then overlay user config, project
    /// config, and environment variables, in that order.
    pub fn load(repo_path: &Path) -> EssResult<Self> {
        let mut config = Self::defaults(repo_path);

        if let Some(user_config_dir) = dirs::config_dir() {
            let user_config_path = user_config_dir.join("ess").join("config.toml");
            if user_config_path.exists() {
                config.merge_from_file(&user_config_path)?;
            }
        }

        let project_config_path = repo_path.join(".ess").join("config.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Create a default configuration for the given repo path.
    pub fn defaults(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            graph: GraphConfig::default(),
            vector: VectorConfig::default(),
            embedding: EmbeddingConfig::default(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
            circuit: CircuitConfig::default(),
            api: ApiConfig::default(),
            extractor_version: Self::default_extractor_version(),
        }
    }

    /// Returns the data/state directory for this repo's persisted files
    /// (hash cache, audit log, vector files, SQLite database).
    pub fn data_dir(&self) -> PathBuf {
        let hash = self.repo_hash();
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ess")
            .join("repos")
            .join(&hash)
    }

    /// Path to the project registry YAML file (spec.md §6).
    pub fn registry_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".veracity")
            .join("projects.yaml")
    }

    /// Merge values from a TOML config file (non-destructive overlay).
    fn merge_from_file(&mut self, path: &Path) -> EssResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content).map_err(|e| EssError::Config {
            message: format!("invalid TOML in {}: {e}", path.display()),
        })?;

        macro_rules! merge_section {
            ($field:ident, $name:literal, $ty:ty) => {
                if let Some(section) = overlay.get($name) {
                    if let Ok(parsed) = section.clone().try_into::<$ty>() {
                        self.$field = parsed;
                    }
                }
            };
        }

        merge_section!(indexing, "indexing", IndexingConfig);
        merge_section!(search, "search", SearchConfig);
        merge_section!(graph, "graph", GraphConfig);
        merge_section!(vector, "vector", VectorConfig);
        merge_section!(embedding, "embedding", EmbeddingConfig);
        merge_section!(watcher, "watcher", WatcherConfig);
        merge_section!(logging, "logging", LoggingConfig);
        merge_section!(circuit, "circuit", CircuitConfig);

        Ok(())
    }

    /// Apply `VERACITY_*` environment variable overrides (spec.md §6).
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VERACITY_GRAPH_URI") {
            self.graph.uri = Some(v);
        }
        if let Ok(v) = std::env::var("VERACITY_GRAPH_USER") {
            self.graph.user = Some(v);
        }
        if let Ok(v) = std::env::var("VERACITY_GRAPH_PASSWORD") {
            self.graph.password = Some(v);
        }
        if let Ok(v) = std::env::var("VERACITY_VECTOR_URL") {
            self.vector.url = Some(v);
        }
        if let Ok(v) = std::env::var("VERACITY_EMBED_URL") {
            self.embedding.url = Some(v);
        }
        if let Ok(v) = std::env::var("VERACITY_EMBED_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("VERACITY_EMBED_DIMS") {
            if let Ok(dims) = v.parse() {
                self.embedding.dims = dims;
            }
        }
        if let Ok(v) = std::env::var("VERACITY_EMBED_SEED") {
            if let Ok(seed) = v.parse() {
                self.embedding.seed = seed;
            }
        }
        if let Ok(v) = std::env::var("VERACITY_API_TOKEN") {
            self.api.token = Some(v);
        }
        if let Ok(v) = std::env::var("VERACITY_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("VERACITY_EXTRACTOR_VERSION") {
            self.extractor_version = v;
        }
    }

    /// Compute a short hash of the repo path for the data directory name.
    ///
    /// Normalizes the path to avoid Windows `\\?\` extended path prefix
    /// causing different hashes for the same physical directory.
    fn repo_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let path_str = self.repo_path.to_string_lossy();
        let normalized = path_str.strip_prefix(r"\\?\").unwrap_or(&path_str);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.indexing.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.embedding.dims, 768);
        assert_eq!(config.watcher.debounce_seconds, 2);
        assert_eq!(config.search.total_deadline_ms, 1500);
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        std::env::set_var("VERACITY_EMBED_DIMS", "256");
        std::env::set_var("VERACITY_API_TOKEN", "secret-token");
        let mut config = Config::defaults(Path::new("/tmp/test-repo"));
        config.apply_env_overrides();
        assert_eq!(config.embedding.dims, 256);
        assert_eq!(config.api.token.as_deref(), Some("secret-token"));
        std::env::remove_var("VERACITY_EMBED_DIMS");
        std::env::remove_var("VERACITY_API_TOKEN");
    }
}
