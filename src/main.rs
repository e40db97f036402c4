//! Kollaborate - task watcher for LLM agent pools
//!
//! Keeps a pool of LLM CLI agents in tmux sessions in sync with a
//! plain-text task ledger until interrupted.

use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kollaborate::{
    Capacity, Engine, KollabError, LedgerStore, Shutdown, SpecGate, TmuxSessions, WatcherConfig,
};

#[derive(Parser)]
#[command(name = "kollaborate")]
#[command(version)]
#[command(about = "Task watcher that keeps tmux-hosted LLM agents in sync with a task ledger", long_about = None)]
struct Cli {
    /// Maximum concurrent worker agents
    #[arg(default_value = "3", env = "KOLLAB_MAX_WORKERS")]
    max_workers: usize,

    /// Maximum concurrent spec-writing agents
    #[arg(default_value = "2", env = "KOLLAB_MAX_SPEC_AGENTS")]
    max_spec_agents: usize,

    /// Project directory (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "kollaborate=debug,info"
    } else {
        "kollaborate=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.is_dir() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    let mut engine = match prepare(&cli, &project_path) {
        Ok(engine) => engine,
        Err(e) => fail(&e),
    };

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    if let Err(e) = engine.run(&shutdown).await {
        fail(&e);
    }
    Ok(())
}

/// Startup checks. Anything that fails here is fatal.
fn prepare(cli: &Cli, project_path: &Path) -> kollaborate::Result<Engine> {
    let capacity = Capacity::new(cli.max_workers, cli.max_spec_agents)?;

    let config = WatcherConfig::load(project_path)?.resolved(project_path);
    config.validate()?;

    let store = LedgerStore::new(config.ledger_path.clone());
    if !store.exists() {
        return Err(KollabError::MissingFile {
            path: store.path().to_path_buf(),
        });
    }

    SpecGate::new(config.spec_dir.clone(), config.spec_min_lines).ensure_dir()?;

    TmuxSessions::check_available()?;
    let sessions = Arc::new(TmuxSessions::new(project_path.to_path_buf()));

    Ok(Engine::new(config, capacity, sessions))
}

fn fail(err: &KollabError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    if let KollabError::MissingFile { path } = err {
        eprintln!(
            "  {} create {} with lines like `NEW: F1 - first task`",
            "Hint:".yellow(),
            path.display()
        );
    }
    std::process::exit(err.exit_code());
}
