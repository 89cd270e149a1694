//! AgentDaemon CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use agentdaemon::cli::{Cli, Command};
use agentdaemon::config::Config;
use agentdaemon::events::read_session_events;
use agentdaemon::llm::create_client;
use agentdaemon::r#loop::SessionEngine;
use agentmemory::MemoryStores;

fn setup_logging(cli_log_level: Option<&str>) {
    let level = match cli_log_level.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            other => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn workspace_or_cwd(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => Ok(path),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

fn memory_dir(config: &Config, workspace: &std::path::Path) -> PathBuf {
    config
        .memory
        .dir
        .clone()
        .unwrap_or_else(|| workspace.join(".agentdaemon").join("memory"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref());

    let config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Run {
            task,
            workspace,
            max_iterations,
        } => {
            let workspace = workspace_or_cwd(workspace)?;
            let mut config = config;
            if let Some(max) = max_iterations {
                config.max_iterations = max;
            }

            let memory = Arc::new(
                MemoryStores::open_with(
                    memory_dir(&config, &workspace),
                    config.memory.embedding_dim,
                    config.memory.reembed_interval,
                    config.feedback.max_entries,
                )
                .context("Failed to open memory stores")?,
            );
            let llm = create_client(&config.llm).context("Failed to create LLM client")?;

            let mut engine = SessionEngine::new(task, config, llm, memory, workspace)
                .context("Failed to create session engine")?;
            info!(session_id = %engine.session_id(), "Session created");

            let report = engine.run().await.context("Session failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Events { session_id, workspace } => {
            let workspace = workspace_or_cwd(workspace)?;
            let events_dir = workspace.join(".agentdaemon").join("events");
            let records = read_session_events(&events_dir, &session_id).context("Failed to read session events")?;
            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
        }

        Command::Memory { workspace } => {
            let workspace = workspace_or_cwd(workspace)?;
            let memory = MemoryStores::open(memory_dir(&config, &workspace)).context("Failed to open memory stores")?;
            let stats = memory.sessions.stats().context("Failed to aggregate session log")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("episodes: {}", memory.episodes.len());
        }
    }

    Ok(())
}
