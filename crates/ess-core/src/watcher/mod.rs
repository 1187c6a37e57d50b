//! Project registry + debounced filesystem watching (C9, spec.md §4.8).
//!
//! [`FileWatcher`] is a long-running, single-project observer: given a
//! [`WatchMode`] it either wires up native filesystem events (`realtime`),
//! runs a periodic full scan (`polling`), or does nothing until explicitly
//! triggered (`git_only`, meant to be driven by a post-commit hook calling
//! [`FileWatcher::trigger_full_scan`]). Every re-ingestion it schedules is
//! recorded in a durable [`IntentLog`] before the write starts and marked
//! complete after, so a crash mid-ingestion is replayed on the next start
//! rather than silently dropped.
//!
//! Ordering comes for free: each watch mode drives [`Engine`] from a single
//! sequential loop, so two events for the same path are always applied in
//! the order they were observed.

mod intent_log;
mod registry;

pub use intent_log::IntentLog;
pub use registry::{ProjectEntry, ProjectRegistry, WatchMode};

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;

use crate::config::WatcherConfig;
use crate::error::{EssError, EssResult};
use crate::pipeline::{Engine, IndexReport};
use crate::types::PipelineEvent;

/// File system watcher that drives an [`Engine`]'s incremental re-indexing.
pub struct FileWatcher {
    root: PathBuf,
    config: WatcherConfig,
    watch_mode: WatchMode,
    intent_log: IntentLog,
}

impl FileWatcher {
    /// Create a watcher rooted at `root`, persisting its intent log under
    /// `data_dir` (typically the owning project's `Config::data_dir()`).
    pub fn new(root: &Path, data_dir: &Path, watch_mode: WatchMode, config: &WatcherConfig) -> EssResult<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            config: config.clone(),
            watch_mode,
            intent_log: IntentLog::open(data_dir)?,
        })
    }

    /// Run the watcher against `engine` until the process exits. Replays
    /// any intent-log entries left pending by a previous crash, then
    /// dispatches to the configured watch mode. Blocks; callers typically
    /// drive this from a dedicated task per project.
    pub async fn run(&self, engine: &Engine) -> EssResult<()> {
        self.replay_pending(engine)?;
        match self.watch_mode {
            WatchMode::Realtime => tokio::task::block_in_place(|| self.run_realtime(engine)),
            WatchMode::Polling => self.run_polling(engine).await,
            // External trigger only; see `trigger_full_scan`.
            WatchMode::GitOnly => {
                tracing::info!(root = %self.root.display(), "watcher idle in git-only mode");
                Ok(())
            }
        }
    }

    /// Perform one full directory scan and re-index any changed files,
    /// recorded through the intent log like any other scheduled work.
    /// This is the entry point a `git_only` project's post-commit hook (or
    /// a one-shot CLI invocation) calls directly.
    pub fn trigger_full_scan(&self, engine: &Engine) -> EssResult<IndexReport> {
        const FULL_SCAN_MARKER: &str = "<full-scan>";
        let id = self.intent_log.schedule(FULL_SCAN_MARKER)?;
        let report = engine.index(false);
        self.intent_log.complete(id, FULL_SCAN_MARKER)?;
        report
    }

    fn replay_pending(&self, engine: &Engine) -> EssResult<()> {
        for path in self.intent_log.pending()? {
            tracing::info!(path = %path, "replaying intent-log entry left pending by a previous crash");
            if let Err(e) = self.process_one(engine, &path) {
                tracing::warn!(path = %path, error = %e, "failed to replay pending intent-log entry");
            }
        }
        Ok(())
    }

    fn run_realtime(&self, engine: &Engine) -> EssResult<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        let debounce = Duration::from_secs(self.config.debounce_seconds.max(1));
        let mut debouncer =
            new_debouncer(debounce, tx).map_err(|e| EssError::Internal(format!("failed to start file watcher: {e}")))?;
        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| EssError::Internal(format!("failed to watch {}: {e}", self.root.display())))?;

        tracing::info!(root = %self.root.display(), "realtime file watcher started");

        for result in rx {
            match result {
                Ok(events) => {
                    for event in events {
                        let Some(rel_path) = relative_path(&self.root, &event.path) else {
                            continue;
                        };
                        if let Err(e) = self.process_one(engine, &rel_path) {
                            tracing::warn!(path = %rel_path, error = %e, "failed to reindex after file-system event");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = ?e, "file watcher debounce error"),
            }
        }
        Ok(())
    }

    async fn run_polling(&self, engine: &Engine) -> EssResult<()> {
        let interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; callers already run an initial index() at startup

        loop {
            ticker.tick().await;
            if let Err(e) = self.trigger_full_scan(engine) {
                tracing::warn!(error = %e, "polling scan failed");
            }
        }
    }

    /// Schedule, apply, and complete one path's re-ingestion. `Engine`
    /// itself determines created/modified vs. deleted by checking whether
    /// the path still exists, so every event is dispatched the same way.
    fn process_one(&self, engine: &Engine, rel_path: &str) -> EssResult<()> {
        let id = self.intent_log.schedule(rel_path)?;
        engine.handle_event(PipelineEvent::FileChanged {
            path: PathBuf::from(rel_path),
        })?;
        self.intent_log.complete(id, rel_path)?;
        Ok(())
    }
}

/// `path` relative to `root`, using forward slashes regardless of platform,
/// matching the separator convention `discovery::discover` already uses.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_strips_root_and_normalizes_separators() {
        let root = Path::new("/repo");
        let path = Path::new("/repo/src/lib.rs");
        assert_eq!(relative_path(root, path), Some("src/lib.rs".to_string()));
    }

    #[test]
    fn test_relative_path_none_outside_root() {
        let root = Path::new("/repo");
        let path = Path::new("/other/lib.rs");
        assert_eq!(relative_path(root, path), None);
    }

    #[test]
    fn test_new_creates_intent_log_directory() {
        let data_dir = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        let watcher = FileWatcher::new(
            root.path(),
            data_dir.path(),
            WatchMode::GitOnly,
            &WatcherConfig::default(),
        )
        .expect("new");
        assert!(watcher.intent_log.pending().expect("pending").is_empty());
    }
}
