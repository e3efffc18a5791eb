//! Queue status command.
//!
//! Reports, per queue, the ready-list depth and how many delayed entries are
//! pending and already due.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::Tabled;

use tasker_core::clock::{Clock, SystemClock};
use tasker_core::config::TaskerConfig;
use tasker_core::store::{QueueStore, StoreKeys};
use tasker_core::tasks::DelayedEntry;

use super::{connect, load_config};
use crate::output::{self, OutputFormat};

#[derive(Debug, Default, Serialize, Tabled, PartialEq)]
struct QueueRow {
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Max Workers")]
    max_workers: usize,
    #[tabled(rename = "Ready")]
    ready: usize,
    #[tabled(rename = "Due")]
    due: usize,
}

pub async fn execute(path: Option<&str>, format: OutputFormat) -> Result<()> {
    let config = load_config(path)?;
    let store = connect(&config).await?;
    let keys = StoreKeys::new(config.namespace.clone());

    let scheduled = keys.scheduled();
    let due = store
        .sorted_range_by_max_score(&scheduled, SystemClock.now())
        .await?;
    let pending = store.sorted_len(&scheduled).await?;

    let mut rows = rows_for(&config, &due);
    for row in rows.iter_mut() {
        row.ready = store.list_len(&keys.ready(&row.queue)).await?;
    }

    match format {
        OutputFormat::Table => {
            output::print_header(&format!("Namespace '{}'", config.namespace));
            output::print_list(&rows, format)?;
            output::print_detail("delayed", &pending.to_string());
            output::print_detail("due now", &due.len().to_string());
        }
        _ => output::print_item(
            &serde_json::json!({
                "namespace": config.namespace,
                "delayed": pending,
                "due": due.len(),
                "queues": rows,
            }),
            format,
        )?,
    }
    Ok(())
}

/// One row per declared queue, then one per undeclared queue found among
/// due entries.
fn rows_for(config: &TaskerConfig, due: &[String]) -> Vec<QueueRow> {
    let mut due_by_queue: BTreeMap<String, usize> = BTreeMap::new();
    for member in due {
        if let Ok(entry) = DelayedEntry::from_member(member) {
            *due_by_queue.entry(entry.queue).or_insert(0) += 1;
        }
    }

    let mut rows: Vec<QueueRow> = config
        .workers
        .iter()
        .map(|(queue, max)| QueueRow {
            queue: queue.clone(),
            max_workers: *max,
            due: due_by_queue.remove(queue).unwrap_or(0),
            ..Default::default()
        })
        .collect();

    rows.extend(due_by_queue.into_iter().map(|(queue, due)| QueueRow {
        queue,
        due,
        ..Default::default()
    }));
    rows
}
