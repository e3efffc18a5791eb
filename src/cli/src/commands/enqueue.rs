//! Task enqueue command.
//!
//! Builds a task from the command line and inserts it into the delayed
//! container, exactly as an in-process producer would.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use tasker_core::clock::{Clock, SystemClock};
use tasker_core::store::StoreKeys;
use tasker_core::tasks::{Task, TaskQueue, DEFAULT_QUEUE};

use super::{connect, load_config};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct EnqueueArgs {
    /// Registered task type
    task_type: String,

    /// Target queue
    #[arg(short, long, default_value = DEFAULT_QUEUE)]
    queue: String,

    /// Task argument as key=value (value parsed as JSON, else kept as a string)
    #[arg(short, long = "arg", value_name = "KEY=VALUE")]
    args: Vec<String>,

    /// Seconds before the first attempt becomes eligible
    #[arg(short, long, default_value = "0")]
    delay: f64,

    /// Retry delays in seconds, comma separated (e.g. 1,5,10)
    #[arg(short, long, value_delimiter = ',')]
    retry: Vec<f64>,
}

#[derive(Serialize)]
struct EnqueueReceipt {
    fingerprint: String,
    queue: String,
    ready_at: f64,
    added: bool,
}

pub async fn execute(args: EnqueueArgs, path: Option<&str>, format: OutputFormat) -> Result<()> {
    let config = load_config(path)?;
    let task = build_task(args)?;

    if !config.workers.contains_key(&task.queue) {
        output::print_info(&format!(
            "Queue '{}' has no configured workers; it will not be consumed",
            task.queue
        ));
    }

    let store = connect(&config).await?;
    let clock = SystemClock;
    let ready_at = task.ready_at(clock.now());
    let keys = StoreKeys::new(config.namespace.clone());
    let queue = TaskQueue::new(Arc::new(store), keys, Arc::new(clock));
    let added = queue
        .enqueue_at(&task, ready_at)
        .await
        .context("Failed to enqueue task")?;

    let receipt = EnqueueReceipt {
        fingerprint: task.fingerprint(&config.namespace),
        queue: task.queue.clone(),
        ready_at,
        added,
    };

    match format {
        OutputFormat::Table => {
            if added {
                output::print_success(&format!("Enqueued {} on '{}'", task.task_type, task.queue));
            } else {
                output::print_info("An identical task was already pending; rescheduled it");
            }
            output::print_detail("fingerprint", &receipt.fingerprint);
            output::print_detail("ready_at", &format!("{:.3}", receipt.ready_at));
        }
        _ => output::print_item(&receipt, format)?,
    }
    Ok(())
}

fn build_task(args: EnqueueArgs) -> Result<Task> {
    let delay = seconds(args.delay).context("Invalid --delay")?;
    let strategy = args
        .retry
        .iter()
        .map(|s| seconds(*s))
        .collect::<Result<Vec<_>>>()
        .context("Invalid --retry")?;

    let mut task = Task::new(args.task_type)
        .on_queue(args.queue)
        .with_execution_delay(delay)
        .with_retry_strategy(strategy);

    for pair in &args.args {
        let (key, value) = parse_argument(pair)?;
        task = task.with_argument(key, value);
    }
    Ok(task)
}

fn seconds(value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("{} is not a non-negative number of seconds", value);
    }
    Ok(Duration::from_secs_f64(value))
}

fn parse_argument(pair: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("Argument '{}' must be KEY=VALUE", pair);
    };
    if key.is_empty() {
        bail!("Argument '{}' has an empty key", pair);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
