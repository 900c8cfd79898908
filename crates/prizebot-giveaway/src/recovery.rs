use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::lifecycle::LifecycleController;
use crate::scheduler::Scheduler;
use crate::store::GiveawayStore;
use crate::types::{ConcludeOutcome, ConcludeReason, Giveaway};

/// What a recovery run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Active giveaways that got a fresh timer.
    pub scheduled: usize,
    /// Active giveaways whose deadline passed while offline, now concluded.
    pub concluded_overdue: usize,
    /// Giveaways found `concluding` and driven to completion.
    pub resumed: usize,
    /// Conclusions that failed; they stay in the store for the next run.
    pub failed: usize,
}

/// Startup routine rebuilding live timers from the store.
///
/// Both store reads happen before anything is scheduled or concluded, and a
/// failing read aborts the run: skipping giveaways silently would leave them
/// without a timer forever.
pub struct RecoveryLoader {
    store: Arc<dyn GiveawayStore>,
    lifecycle: Arc<LifecycleController>,
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
}

impl RecoveryLoader {
    pub fn new(
        store: Arc<dyn GiveawayStore>,
        lifecycle: Arc<LifecycleController>,
        scheduler: Arc<Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            scheduler,
            clock,
        }
    }

    pub async fn run(&self) -> Result<RecoveryReport> {
        let active = self.store.active_events(None).map_err(|e| {
            error!(error = %e, "recovery aborted: cannot read active giveaways");
            e
        })?;
        let stranded = self.store.concluding_events().map_err(|e| {
            error!(error = %e, "recovery aborted: cannot read concluding giveaways");
            e
        })?;

        let now = self.clock.now();
        let (overdue, upcoming): (Vec<Giveaway>, Vec<Giveaway>) =
            active.into_iter().partition(|g| g.end_time <= now);

        let mut report = RecoveryReport::default();
        for giveaway in &upcoming {
            self.scheduler.schedule(&giveaway.id, giveaway.end_time);
            report.scheduled += 1;
        }

        let (concluded, failed) = self.conclude_all(&overdue).await;
        report.concluded_overdue = concluded;
        report.failed += failed;

        if !stranded.is_empty() {
            warn!(count = stranded.len(), "found giveaways stranded mid-conclusion");
        }
        let (resumed, failed) = self.conclude_all(&stranded).await;
        report.resumed = resumed;
        report.failed += failed;

        info!(
            scheduled = report.scheduled,
            concluded_overdue = report.concluded_overdue,
            resumed = report.resumed,
            failed = report.failed,
            "giveaway recovery complete"
        );
        Ok(report)
    }

    /// Conclude each giveaway; returns `(completed, failed)`.
    async fn conclude_all(&self, giveaways: &[Giveaway]) -> (usize, usize) {
        let results = join_all(
            giveaways
                .iter()
                .map(|g| self.lifecycle.conclude(&g.id, ConcludeReason::Timeout)),
        )
        .await;

        let mut completed = 0;
        let mut failed = 0;
        for (giveaway, result) in giveaways.iter().zip(results) {
            match result {
                Ok(ConcludeOutcome::AlreadyConcluded) => {}
                Ok(_) => completed += 1,
                Err(e) => {
                    warn!(giveaway_id = %giveaway.id, error = %e, "recovery could not conclude giveaway");
                    failed += 1;
                }
            }
        }
        (completed, failed)
    }
}
