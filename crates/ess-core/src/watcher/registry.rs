//! Project registry (spec.md §6): the YAML file the CLI's `register`
//! subcommand writes to and the daemon reads at startup to learn which
//! projects exist and how each one wants to be watched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EssError, EssResult};

/// How a project's filesystem changes are observed (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchMode {
    /// Native file-system events via `notify`.
    Realtime,
    /// Periodic full directory walk.
    Polling,
    /// Only re-indexed when explicitly triggered (e.g. a post-commit hook).
    GitOnly,
}

impl Default for WatchMode {
    fn default() -> Self {
        Self::Realtime
    }
}

/// One project's entry in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    /// Repository root to index.
    pub root_dir: PathBuf,

    /// Subdirectories to restrict watching to, relative to `root_dir`.
    /// Empty means the whole repository.
    #[serde(default)]
    pub target_dirs: Vec<PathBuf>,

    #[serde(default)]
    pub watch_mode: WatchMode,

    #[serde(default = "ProjectEntry::default_debounce_seconds")]
    pub debounce_seconds: u64,

    #[serde(default = "ProjectEntry::default_enabled")]
    pub enabled: bool,

    /// Extra glob patterns narrowing which files the watcher reacts to,
    /// on top of the indexing config's own exclude list.
    #[serde(default)]
    pub file_patterns: Vec<String>,
}

impl ProjectEntry {
    fn default_debounce_seconds() -> u64 {
        2
    }

    fn default_enabled() -> bool {
        true
    }

    /// A new entry with the given root and defaults for everything else.
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            target_dirs: Vec::new(),
            watch_mode: WatchMode::default(),
            debounce_seconds: Self::default_debounce_seconds(),
            enabled: Self::default_enabled(),
            file_patterns: Vec::new(),
        }
    }
}

/// `project_name -> ProjectEntry`, persisted as YAML at [`crate::config::Config::registry_path`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRegistry(BTreeMap<String, ProjectEntry>);

impl ProjectRegistry {
    /// Load the registry from `path`. A missing file is an empty registry,
    /// not an error — the first `register` call creates it.
    pub fn load(path: &Path) -> EssResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| EssError::Config {
            message: format!("invalid project registry at {}: {e}", path.display()),
        })
    }

    /// Persist the registry to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> EssResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(&self.0)
            .map_err(|e| EssError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Add or replace a project's entry.
    pub fn register(&mut self, name: &str, entry: ProjectEntry) {
        self.0.insert(name.to_string(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&ProjectEntry> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ProjectEntry> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProjectEntry)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_registry_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ProjectRegistry::load(&dir.path().join("projects.yaml")).expect("load");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_round_trips_through_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("projects.yaml");

        let mut registry = ProjectRegistry::default();
        let mut entry = ProjectEntry::new(PathBuf::from("/repos/acme"));
        entry.watch_mode = WatchMode::Polling;
        entry.debounce_seconds = 5;
        registry.register("acme", entry);
        registry.save(&path).expect("save");

        let reloaded = ProjectRegistry::load(&path).expect("reload");
        let entry = reloaded.get("acme").expect("entry present");
        assert_eq!(entry.root_dir, PathBuf::from("/repos/acme"));
        assert_eq!(entry.watch_mode, WatchMode::Polling);
        assert_eq!(entry.debounce_seconds, 5);
    }

    #[test]
    fn test_default_watch_mode_is_realtime() {
        let entry = ProjectEntry::new(PathBuf::from("/repos/acme"));
        assert_eq!(entry.watch_mode, WatchMode::Realtime);
        assert!(entry.enabled);
    }
}
