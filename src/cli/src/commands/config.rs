//! Configuration inspection commands.
//!
//! Configuration comes from an optional file plus `TASKER__*` environment
//! variables, resolved exactly as the dispatcher resolves it.

use anyhow::Result;
use clap::Subcommand;
use tabled::Tabled;

use tasker_core::config::TaskerConfig;

use super::{connect, load_config};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Validate the configuration and check the store is reachable
    Check,
}

#[derive(serde::Serialize, Tabled)]
struct WorkerRow {
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Max Workers")]
    max_workers: usize,
}

pub async fn execute(cmd: ConfigCommands, path: Option<&str>, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = load_config(path)?;
            match format {
                OutputFormat::Table => show_table(&config)?,
                _ => output::print_item(&config, format)?,
            }
        }

        ConfigCommands::Check => {
            let config = load_config(path)?;
            output::print_success("Configuration is valid");

            connect(&config).await?;
            output::print_success(&format!("Store reachable at {}", config.redis_url()));
        }
    }

    Ok(())
}

fn show_table(config: &TaskerConfig) -> Result<()> {
    output::print_header("Configuration");
    output::print_detail("store", &config.redis_url());
    output::print_detail("namespace", &config.namespace);
    output::print_detail("persistent", &config.persistent.to_string());
    output::print_detail("logging", &config.logging.to_string());
    output::print_detail(
        "read_write_timeout",
        &format!("{:?}", config.read_write_timeout),
    );
    output::print_detail("tick", &format!("{:?}", config.tick));
    output::print_detail("scheduler_enabled", &config.scheduler_enabled.to_string());
    if let Some(addr) = config.observability.metrics_addr {
        output::print_detail("metrics_addr", &addr.to_string());
    }

    output::print_header("Workers");
    let rows: Vec<WorkerRow> = config
        .workers
        .iter()
        .map(|(queue, max)| WorkerRow {
            queue: queue.clone(),
            max_workers: *max,
        })
        .collect();
    output::print_list(&rows, OutputFormat::Table)
}
