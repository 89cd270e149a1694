//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AgentDaemon - autonomous agent session supervisor
#[derive(Parser)]
#[command(name = "ad", about = "Run autonomous agent sessions against a sandboxed workspace", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one task to a terminal outcome
    Run {
        /// Task description
        task: String,

        /// Workspace root (default: current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Maximum iterations
        #[arg(short, long)]
        max_iterations: Option<u32>,
    },

    /// Print a session's event records
    Events {
        /// Session id
        session_id: String,

        /// Workspace root (default: current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Show aggregated memory statistics
    Memory {
        /// Workspace root (default: current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from(["ad", "run", "clone the repo", "--max-iterations", "5"]).unwrap();
        match cli.command {
            Command::Run { task, max_iterations, .. } => {
                assert_eq!(task, "clone the repo");
                assert_eq!(max_iterations, Some(5));
            }
            _ => panic!("expected run"),
        }
    }
}
