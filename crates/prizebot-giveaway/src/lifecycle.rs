use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use prizebot_core::GiveawayId;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::announce::{best_effort, Announcer};
use crate::clock::Clock;
use crate::error::{GiveawayError, Result};
use crate::registry::ParticipantRegistry;
use crate::scheduler::Scheduler;
use crate::selection::select_winner;
use crate::store::GiveawayStore;
use crate::types::{
    ConcludeOutcome, ConcludeReason, ConclusionClaim, DrawResult, Giveaway, GiveawayStatus,
};

/// Bounded exponential backoff for the conclusion write.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Owner of the giveaway state machine.
///
/// [`conclude`](Self::conclude) is the single entry point for ending a
/// giveaway, shared by the deadline timer, the administrative "end" command
/// and startup recovery. It is idempotent: exactly one caller performs the
/// draw and the write, every other caller observes `AlreadyConcluded`.
pub struct LifecycleController {
    store: Arc<dyn GiveawayStore>,
    registry: Arc<ParticipantRegistry>,
    scheduler: Arc<Scheduler>,
    announcer: Arc<dyn Announcer>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    retry: RetryPolicy,
    /// Giveaways with a conclusion running in this process.
    in_flight: DashSet<GiveawayId>,
}

/// Removes a giveaway from the in-flight set when the conclusion attempt ends.
struct InFlight<'a> {
    set: &'a DashSet<GiveawayId>,
    id: GiveawayId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn GiveawayStore>,
        registry: Arc<ParticipantRegistry>,
        scheduler: Arc<Scheduler>,
        announcer: Arc<dyn Announcer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            scheduler,
            announcer,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
            retry: RetryPolicy::default(),
            in_flight: DashSet::new(),
        }
    }

    /// Replace the random source used for draws.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// End a giveaway: draw a winner (if anyone entered), persist, announce,
    /// retire the timer.
    ///
    /// The write happens before the announcement, so a crash in between can
    /// at worst lose the announcement, never produce a second winner. If the
    /// write keeps failing the giveaway stays `concluding`, nothing is
    /// announced, and the next recovery run (or the still-armed timer)
    /// finishes it.
    pub async fn conclude(
        &self,
        id: &GiveawayId,
        reason: ConcludeReason,
    ) -> Result<ConcludeOutcome> {
        // The in-flight claim covers concurrent callers in this process; the
        // store's `active -> concluding` swap covers everything else.
        let Some(_claim) = self.claim(id) else {
            debug!(giveaway_id = %id, %reason, "conclusion already in flight");
            return Ok(ConcludeOutcome::AlreadyConcluded);
        };

        let giveaway = match self.store.begin_conclusion(id)? {
            ConclusionClaim::Claimed(g) => {
                info!(giveaway_id = %id, %reason, "giveaway concluding");
                g
            }
            ConclusionClaim::Stranded(g) => {
                warn!(giveaway_id = %id, %reason, "resuming interrupted conclusion");
                g
            }
            ConclusionClaim::Finished(_) => {
                debug!(giveaway_id = %id, %reason, "giveaway already concluded");
                return Ok(ConcludeOutcome::AlreadyConcluded);
            }
        };

        let result = match &giveaway.winner_id {
            // A resumed conclusion keeps a winner that was already written.
            Some(winner) => DrawResult::Winner(winner.clone()),
            None => {
                let participants = self.registry.participants(id)?;
                if participants.is_empty() {
                    DrawResult::NoParticipants
                } else {
                    DrawResult::Winner(self.draw(&participants))
                }
            }
        };

        let concluded_at = self.clock.now();
        if !self
            .persist_conclusion(id, result.winner_id(), concluded_at)
            .await?
        {
            // The guard on `status = concluding` did not match: someone else
            // completed this giveaway.
            warn!(giveaway_id = %id, "conclusion write lost its guard");
            return Ok(ConcludeOutcome::AlreadyConcluded);
        }

        let concluded = Giveaway {
            status: GiveawayStatus::Concluded,
            winner_id: result.winner_id().map(String::from),
            concluded_at: Some(concluded_at),
            ..giveaway
        };
        match &result {
            DrawResult::Winner(w) => info!(giveaway_id = %id, winner = %w, "giveaway concluded"),
            DrawResult::NoParticipants => {
                info!(giveaway_id = %id, "giveaway concluded without participants")
            }
        }

        best_effort(
            "concluded",
            id,
            self.announcer.on_concluded(&concluded, &result),
        )
        .await;
        self.scheduler.cancel(id);
        self.registry.release(id);

        Ok(match result {
            DrawResult::Winner(w) => ConcludeOutcome::Winner(w),
            DrawResult::NoParticipants => ConcludeOutcome::NoParticipants,
        })
    }

    /// Draw a new winner for a concluded giveaway.
    ///
    /// The draw is over the full participant list, so the previous winner can
    /// be drawn again. `status` and `concluded_at` are left untouched.
    pub async fn reroll(&self, id: &GiveawayId) -> Result<String> {
        let giveaway = self.store.get_event(id)?;
        if giveaway.status != GiveawayStatus::Concluded {
            return Err(GiveawayError::InvalidState {
                id: id.clone(),
                status: giveaway.status,
            });
        }

        let participants = self.registry.participants(id)?;
        if participants.is_empty() {
            return Err(GiveawayError::NoParticipants { id: id.clone() });
        }

        let winner = self.draw(&participants);
        if !self.store.set_winner(id, &winner)? {
            let current = self.store.get_event(id)?;
            return Err(GiveawayError::InvalidState {
                id: id.clone(),
                status: current.status,
            });
        }
        info!(giveaway_id = %id, winner = %winner, previous = ?giveaway.winner_id, "giveaway rerolled");

        let rerolled = Giveaway {
            winner_id: Some(winner.clone()),
            ..giveaway
        };
        best_effort("rerolled", id, self.announcer.on_rerolled(&rerolled, &winner)).await;
        Ok(winner)
    }

    fn claim(&self, id: &GiveawayId) -> Option<InFlight<'_>> {
        self.in_flight.insert(id.clone()).then(|| InFlight {
            set: &self.in_flight,
            id: id.clone(),
        })
    }

    fn draw(&self, participants: &[String]) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        select_winner(participants, &mut *rng).to_string()
    }

    /// `mark_concluded` with exponential backoff on store failures.
    async fn persist_conclusion(
        &self,
        id: &GiveawayId,
        winner_id: Option<&str>,
        concluded_at: DateTime<Utc>,
    ) -> Result<bool> {
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.base_delay;
        let mut attempt = 1;
        loop {
            match self.store.mark_concluded(id, winner_id, concluded_at) {
                Ok(written) => return Ok(written),
                Err(GiveawayError::StoreUnavailable(reason)) if attempt < attempts => {
                    warn!(
                        giveaway_id = %id,
                        attempt,
                        max = attempts,
                        error = %reason,
                        retry_after_ms = delay.as_millis() as u64,
                        "conclusion write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    error!(giveaway_id = %id, error = %e, "conclusion write failed, left for recovery");
                    return Err(e);
                }
            }
        }
    }
}
