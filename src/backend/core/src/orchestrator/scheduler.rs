//! Delayed-task promotion.
//!
//! The scheduler moves due entries from the namespace-wide delayed container
//! into their queue's ready list. Each move is an optimistic transaction on
//! the delayed container, so redundant schedulers racing the same entry
//! promote it exactly once: the loser's commit aborts and it re-reads on its
//! next tick.

use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::TaskerContext;
use crate::error::Result;
use crate::store::{StoreKeys, Transaction};
use crate::tasks::DelayedEntry;

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    /// Entries moved to a ready list
    pub promoted: usize,
    /// Commits aborted by a concurrent write; retried next tick
    pub conflicts: usize,
    /// Entries already gone when re-checked under watch
    pub skipped: usize,
    /// Unreadable envelopes removed
    pub discarded: usize,
}

impl PromotionReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

enum Promotion {
    Promoted,
    Conflict,
    Skipped,
}

/// Promotes due delayed tasks.
pub struct Scheduler {
    ctx: TaskerContext,
    keys: StoreKeys,
}

impl Scheduler {
    pub fn new(ctx: TaskerContext) -> Self {
        let keys = ctx.keys();
        Self { ctx, keys }
    }

    /// Run one promotion pass over every entry due now.
    ///
    /// Candidates are visited queue by queue in configured declaration order;
    /// entries for queues missing from the workers table come last.
    pub async fn tick(&self) -> Result<PromotionReport> {
        let scheduled = self.keys.scheduled();
        let now = self.ctx.clock().now();
        let members = self
            .ctx
            .store()
            .sorted_range_by_max_score(&scheduled, now)
            .await?;

        let mut report = PromotionReport::default();
        let mut candidates = Vec::with_capacity(members.len());

        for member in members {
            match DelayedEntry::from_member(&member) {
                Ok(entry) => candidates.push((member, entry)),
                Err(e) => {
                    warn!(member = %member, error = %e, "Discarding unreadable delayed entry");
                    if self.ctx.store().sorted_remove(&scheduled, &member).await? {
                        report.discarded += 1;
                    }
                }
            }
        }

        let workers = &self.ctx.config().workers;
        // Stable: score order is kept within a queue
        candidates.sort_by_key(|(_, entry)| workers.get_index_of(&entry.queue).unwrap_or(usize::MAX));

        for (member, entry) in &candidates {
            match self.promote(&scheduled, member, entry).await? {
                Promotion::Promoted => {
                    report.promoted += 1;
                    counter!("tasker_promotions_total", "queue" => entry.queue.clone()).increment(1);
                }
                Promotion::Conflict => {
                    report.conflicts += 1;
                    counter!("tasker_promotion_conflicts_total").increment(1);
                }
                Promotion::Skipped => report.skipped += 1,
            }
        }

        if !report.is_idle() {
            debug!(
                promoted = report.promoted,
                conflicts = report.conflicts,
                skipped = report.skipped,
                discarded = report.discarded,
                "Scheduler tick"
            );
        }
        Ok(report)
    }

    async fn promote(&self, scheduled: &str, member: &str, entry: &DelayedEntry) -> Result<Promotion> {
        let store = self.ctx.store();
        let mut watch = store.watch(scheduled).await?;

        // Another scheduler may have committed between our read and our watch
        if !watch.sorted_contains(scheduled, member).await? {
            watch.unwatch().await?;
            return Ok(Promotion::Skipped);
        }

        let tx = Transaction::new()
            .push(self.keys.ready(&entry.queue), entry.data.clone())
            .sorted_remove(scheduled, member);

        if watch.commit(tx).await? {
            Ok(Promotion::Promoted)
        } else {
            Ok(Promotion::Conflict)
        }
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// A failed tick is logged and retried on the next one.
    pub async fn run(self, shutdown: CancellationToken) {
        let tick = self.ctx.config().tick;
        info!(
            namespace = %self.keys.namespace(),
            tick_ms = tick.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            if let Err(e) = self.tick().await {
                warn!(error = %e, "Scheduler tick failed, retrying next tick");
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(tick) => {}
            }
        }

        info!("Scheduler stopped");
    }
}
