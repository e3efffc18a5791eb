//! Tasker CLI - Command-line interface for Tasker task queues.
//!
//! Provides commands to enqueue tasks, inspect queue depth, and check the
//! effective configuration.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, enqueue, status};
use output::OutputFormat;

/// Tasker - Redis-backed background task dispatcher CLI
#[derive(Parser)]
#[command(
    name = "tasker",
    version,
    about = "Tasker - Redis-backed background task dispatcher",
    long_about = "CLI tool for enqueueing Tasker tasks and inspecting queue state.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (environment variables still override it)
    #[arg(short, long, global = true, env = "TASKER_CONFIG")]
    config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a task
    Enqueue(enqueue::EnqueueArgs),

    /// Show ready and delayed counts per queue
    Status,

    /// Configuration inspection
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;
    let path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Enqueue(args) => enqueue::execute(args, path, format).await,
        Commands::Status => status::execute(path, format).await,
        Commands::Config(cmd) => config::execute(cmd, path, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
