//! ESS CLI (spec.md §6): the thin `register` / `index` / `query` / `config`
//! surface over the core pipeline and query engine.
//!
//! Every subcommand resolves a project name to a root directory through the
//! project registry (`~/.veracity/projects.yaml`), loads that project's
//! layered [`Config`], and drives exactly one [`Engine`] call -- the CLI
//! never touches `store`/`vector`/`search` directly, matching every other
//! adapter in this workspace.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ess_core::watcher::{ProjectEntry, ProjectRegistry, WatchMode};
use ess_core::{Config, EssError, Engine};

/// ESS -- Engineering Support System CLI.
#[derive(Parser, Debug)]
#[command(name = "ess", version, about = "Deterministic, evidence-based code intelligence")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a project in `~/.veracity/projects.yaml`.
    Register {
        /// Project name (slug).
        project: String,

        /// Repository root to index.
        #[arg(long)]
        root: PathBuf,

        /// Subdirectories to restrict watching to (repeatable).
        #[arg(long = "target-dirs", value_delimiter = ',')]
        target_dirs: Vec<PathBuf>,

        /// How the watcher observes this project.
        #[arg(long = "watch-mode", value_enum, default_value = "realtime")]
        watch_mode: CliWatchMode,
    },

    /// Run the write path (discover, parse, chunk, embed, write) for a
    /// registered project.
    Index {
        /// Registered project name.
        project: String,

        /// Ignore the content-hash cache and re-index every file.
        #[arg(long)]
        force: bool,

        /// Only re-index files reported changed (the default; accepted for
        /// symmetry with `--force`, since a full `index` is always
        /// hash-gated unless `--force` is given).
        #[arg(long)]
        incremental: bool,
    },

    /// Run one query against a registered project's query engine.
    Query {
        /// Registered project name.
        project: String,

        /// Natural-language question.
        question: String,
    },

    /// Show or initialize a project's configuration.
    Config {
        /// Repository root (defaults to the current directory).
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Print the effective, layered configuration as TOML.
        #[arg(long)]
        show: bool,

        /// Write `<root>/.ess/config.toml` with the built-in defaults, if it
        /// does not already exist.
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
#[value(rename_all = "kebab-case")]
enum CliWatchMode {
    Realtime,
    Polling,
    GitOnly,
}

impl From<CliWatchMode> for WatchMode {
    fn from(mode: CliWatchMode) -> Self {
        match mode {
            CliWatchMode::Realtime => WatchMode::Realtime,
            CliWatchMode::Polling => WatchMode::Polling,
            CliWatchMode::GitOnly => WatchMode::GitOnly,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_level.clone())
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run(cli.command) {
        Ok(()) => 0,
        Err(CliError::Ess(e)) => {
            eprintln!("error: {e}");
            e.cli_exit_code()
        }
        Err(CliError::Other(msg)) => {
            eprintln!("error: {msg}");
            2
        }
    };

    std::process::exit(exit_code);
}

enum CliError {
    Ess(EssError),
    Other(String),
}

impl From<EssError> for CliError {
    fn from(e: EssError) -> Self {
        Self::Ess(e)
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Register { project, root, target_dirs, watch_mode } => {
            cmd_register(&project, root, target_dirs, watch_mode.into())
        }
        Commands::Index { project, force, incremental } => {
            let _ = incremental; // incremental is the default; see Index doc comment
            cmd_index(&project, force)
        }
        Commands::Query { project, question } => cmd_query(&project, &question),
        Commands::Config { root, show, init } => cmd_config(root, show, init),
    }
}

fn registry_path() -> PathBuf {
    Config::registry_path()
}

fn load_registry() -> Result<ProjectRegistry, CliError> {
    ProjectRegistry::load(&registry_path()).map_err(CliError::from)
}

fn resolve_project(project: &str) -> Result<PathBuf, CliError> {
    let registry = load_registry()?;
    let entry = registry.get(project).ok_or_else(|| {
        CliError::Ess(EssError::NotFound {
            entity: format!("project '{project}' (run `ess register {project} --root <dir>` first)"),
        })
    })?;
    Ok(entry.root_dir.clone())
}

fn cmd_register(
    project: &str,
    root: PathBuf,
    target_dirs: Vec<PathBuf>,
    watch_mode: WatchMode,
) -> Result<(), CliError> {
    let root = root
        .canonicalize()
        .map_err(|e| CliError::Other(format!("cannot resolve root '{}': {e}", root.display())))?;

    let mut registry = ProjectRegistry::load(&registry_path())?;
    let mut entry = ProjectEntry::new(root.clone());
    entry.target_dirs = target_dirs;
    entry.watch_mode = watch_mode;
    registry.register(project, entry);
    registry.save(&registry_path())?;

    println!("registered '{project}' -> {}", root.display());
    Ok(())
}

fn cmd_index(project: &str, force: bool) -> Result<(), CliError> {
    let root = resolve_project(project)?;
    let config = Config::load(&root)?;
    let engine = Engine::open(project, config)?;

    let report = engine.index(force)?;
    println!(
        "indexed {}: {} changed, {} unchanged, {} removed, {} code entities, {} chunks, {} embeddings ({} skipped) in {}ms",
        project,
        report.files_indexed,
        report.files_unchanged,
        report.files_removed,
        report.code_entities_indexed,
        report.chunks_indexed,
        report.embeddings_written,
        report.files_skipped.len(),
        report.elapsed_ms,
    );
    for skipped in &report.files_skipped {
        eprintln!("  skipped {}: {}", skipped.path, skipped.reason);
    }
    Ok(())
}

fn cmd_config(root: PathBuf, show: bool, init: bool) -> Result<(), CliError> {
    let root = root
        .canonicalize()
        .map_err(|e| CliError::Other(format!("cannot resolve root '{}': {e}", root.display())))?;

    if init {
        let config_dir = root.join(".ess");
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            println!("{} already exists, leaving it in place", config_path.display());
        } else {
            std::fs::create_dir_all(&config_dir)
                .map_err(|e| CliError::Other(format!("failed to create {}: {e}", config_dir.display())))?;
            let defaults = Config::defaults(&root);
            let toml = toml::to_string_pretty(&defaults)
                .map_err(|e| CliError::Other(format!("failed to serialize default config: {e}")))?;
            std::fs::write(&config_path, toml)
                .map_err(|e| CliError::Other(format!("failed to write {}: {e}", config_path.display())))?;
            println!("wrote {}", config_path.display());
        }
    }

    if show {
        let config = Config::load(&root)?;
        let toml = toml::to_string_pretty(&config)
            .map_err(|e| CliError::Other(format!("failed to serialize effective config: {e}")))?;
        print!("{toml}");
    }

    if !init && !show {
        println!("nothing to do; pass --show and/or --init");
    }

    Ok(())
}

fn cmd_query(project: &str, question: &str) -> Result<(), CliError> {
    let root = resolve_project(project)?;
    let config = Config::load(&root)?;
    let engine = Engine::open(project, config)?;

    let packet = engine.query(question)?;
    let json = serde_json::to_string_pretty(&packet)
        .map_err(|e| CliError::Other(format!("failed to serialize response: {e}")))?;
    println!("{json}");

    if packet.status == ess_core::types::ResponseStatus::Unavailable {
        return Err(CliError::Ess(EssError::BackendUnavailable {
            service: "graph+vector".into(),
            reason: "both backends unavailable".into(),
        }));
    }
    Ok(())
}
