//! ESS Watcher Daemon (spec.md §4.8, C9).
//!
//! A long-running, per-machine observer that reads the project registry
//! (`~/.veracity/projects.yaml`), opens one [`Engine`] per enabled project,
//! and drives each through its configured [`WatchMode`] until the process
//! receives a shutdown signal. Projects are watched independently -- a
//! crash-safe intent log inside each project's [`FileWatcher`] means a
//! restart after an unclean shutdown only replays that project's own
//! pending work.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ess_core::watcher::{FileWatcher, ProjectEntry, ProjectRegistry, WatchMode};
use ess_core::{Config, Engine};

/// ESS watcher daemon -- persistent background indexer.
#[derive(Parser, Debug)]
#[command(name = "ess-daemon", version, about = "Background watcher for ESS-registered projects")]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Skip the startup full index for every project (incremental watching
    /// still runs; useful when the registry's projects are already current).
    #[arg(long)]
    no_auto_index: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.clone())
        .with_writer(std::io::stderr)
        .init();

    let registry_path = Config::registry_path();
    let registry = ProjectRegistry::load(&registry_path)
        .with_context(|| format!("failed to load project registry at {}", registry_path.display()))?;

    if registry.is_empty() {
        tracing::warn!(
            path = %registry_path.display(),
            "project registry is empty; nothing to watch (run `ess register <project> --root <dir>` first)"
        );
        return Ok(());
    }

    let mut tasks = tokio::task::JoinSet::new();
    for (name, entry) in registry.iter() {
        if !entry.enabled {
            tracing::info!(project = %name, "project disabled in registry, skipping");
            continue;
        }
        let name = name.clone();
        let entry = entry.clone();
        let auto_index = !args.no_auto_index;
        tasks.spawn(async move { watch_project(name, entry, auto_index).await });
    }

    if tasks.is_empty() {
        tracing::warn!("no enabled projects in the registry; exiting");
        return Ok(());
    }

    tracing::info!(projects = tasks.len(), "daemon started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        () = wait_for_all(&mut tasks) => {
            tracing::warn!("every watched project exited on its own (all are git-only?)");
        }
    }

    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    tracing::info!("daemon shut down");
    Ok(())
}

async fn wait_for_all(tasks: &mut tokio::task::JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!(error = %e, "watcher task panicked");
            }
        }
    }
}

/// Open `project`'s engine and drive its watcher until the process exits
/// or the task is aborted by the shutdown path in `main`.
async fn watch_project(project: String, entry: ProjectEntry, auto_index: bool) {
    if let Err(e) = watch_project_inner(&project, &entry, auto_index).await {
        tracing::error!(project = %project, error = %e, "project watcher exited with error");
    }
}

async fn watch_project_inner(project: &str, entry: &ProjectEntry, auto_index: bool) -> anyhow::Result<()> {
    let root = entry.root_dir.clone();
    let mut config = Config::load(&root)?;
    config.watcher.debounce_seconds = entry.debounce_seconds.max(1);
    let data_dir = config.data_dir();

    let project_owned = project.to_string();
    let config_for_open = config.clone();
    let engine = tokio::task::spawn_blocking(move || Engine::open(&project_owned, config_for_open))
        .await
        .context("engine open task panicked")??;
    let engine = Arc::new(engine);

    if auto_index {
        let status = engine.status()?;
        if status.nodes_indexed == 0 {
            tracing::info!(project = %project, "no existing index, running initial full index");
            let engine_for_index = engine.clone();
            let report = tokio::task::spawn_blocking(move || engine_for_index.index(false))
                .await
                .context("initial index task panicked")??;
            tracing::info!(
                project = %project,
                files = report.files_indexed,
                chunks = report.chunks_indexed,
                elapsed_ms = report.elapsed_ms,
                "initial index complete"
            );
        } else {
            tracing::info!(project = %project, nodes = status.nodes_indexed, "using existing index");
        }
    }

    let watcher = FileWatcher::new(&root, &data_dir, entry.watch_mode, &config.watcher)?;

    tracing::info!(project = %project, root = %root.display(), mode = ?entry.watch_mode, "watching project");

    match entry.watch_mode {
        WatchMode::GitOnly => {
            tracing::info!(project = %project, "git-only mode: idle until externally triggered, nothing further to do in this process");
            Ok(())
        }
        WatchMode::Realtime | WatchMode::Polling => {
            watcher.run(&engine).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn git_only_project_returns_immediately() {
        std::env::set_var("VERACITY_SKIP_MODEL_DOWNLOAD", "1");
        let repo_dir = tempfile::TempDir::new().expect("repo dir");
        std::fs::write(repo_dir.path().join("main.py"), "print('hi')\n").expect("write fixture");

        let mut entry = ProjectEntry::new(repo_dir.path().to_path_buf());
        entry.watch_mode = WatchMode::GitOnly;

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            watch_project_inner("git-only-test", &entry, true),
        )
        .await
        .expect("git-only watcher should return promptly instead of blocking");

        assert!(result.is_ok());
    }

    #[test]
    fn disabled_project_is_skipped_before_any_watcher_spawns() {
        let mut registry = ProjectRegistry::default();
        let mut entry = ProjectEntry::new(std::path::PathBuf::from("/tmp"));
        entry.enabled = false;
        registry.register("disabled-project", entry);

        let enabled_count = registry.iter().filter(|(_, e)| e.enabled).count();
        assert_eq!(enabled_count, 0);
    }
}
