use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use prizebot_core::config::GiveawaysConfig;
use prizebot_core::GiveawayId;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::announce::{best_effort, Announcer};
use crate::clock::Clock;
use crate::error::{GiveawayError, Result};
use crate::lifecycle::{LifecycleController, RetryPolicy};
use crate::recovery::{RecoveryLoader, RecoveryReport};
use crate::registry::ParticipantRegistry;
use crate::scheduler::{FiredTimers, Scheduler};
use crate::store::GiveawayStore;
use crate::types::{
    ConcludeOutcome, ConcludeReason, CreateGiveaway, Giveaway, GiveawayStatus, GiveawaySummary,
    MembershipChange, Scope, Toggled,
};

/// Seconds before a timed conclusion that failed on the store is attempted again.
const FAILED_CONCLUSION_RETRY_SECS: i64 = 30;

/// The giveaway subsystem, constructed once and handed to every caller.
///
/// Owns the store handle, the participant registry, the scheduler and the
/// lifecycle controller, and exposes the administrative operations on top of
/// them. Command handlers and the timer dispatch loop both go through this
/// object; nothing reaches the components through globals.
pub struct GiveawayService {
    store: Arc<dyn GiveawayStore>,
    registry: Arc<ParticipantRegistry>,
    scheduler: Arc<Scheduler>,
    lifecycle: Arc<LifecycleController>,
    announcer: Arc<dyn Announcer>,
    clock: Arc<dyn Clock>,
    limits: GiveawaysConfig,
}

impl GiveawayService {
    /// Wire up the subsystem. The returned [`FiredTimers`] must be passed to
    /// [`run_timers`](Self::run_timers).
    pub fn new(
        store: Arc<dyn GiveawayStore>,
        announcer: Arc<dyn Announcer>,
        clock: Arc<dyn Clock>,
        limits: GiveawaysConfig,
    ) -> (Self, FiredTimers) {
        Self::build(store, announcer, clock, limits, None)
    }

    /// Like [`new`](Self::new) with a fixed random source for draws.
    pub fn with_rng(
        store: Arc<dyn GiveawayStore>,
        announcer: Arc<dyn Announcer>,
        clock: Arc<dyn Clock>,
        limits: GiveawaysConfig,
        rng: StdRng,
    ) -> (Self, FiredTimers) {
        Self::build(store, announcer, clock, limits, Some(rng))
    }

    fn build(
        store: Arc<dyn GiveawayStore>,
        announcer: Arc<dyn Announcer>,
        clock: Arc<dyn Clock>,
        limits: GiveawaysConfig,
        rng: Option<StdRng>,
    ) -> (Self, FiredTimers) {
        let registry = Arc::new(ParticipantRegistry::new(store.clone(), clock.clone()));
        let (scheduler, fired) = Scheduler::new(clock.clone());
        let scheduler = Arc::new(scheduler);

        let mut lifecycle = LifecycleController::new(
            store.clone(),
            registry.clone(),
            scheduler.clone(),
            announcer.clone(),
            clock.clone(),
        )
        .with_retry(RetryPolicy {
            attempts: limits.store_retry_attempts,
            base_delay: Duration::from_millis(limits.store_retry_base_ms),
        });
        if let Some(rng) = rng {
            lifecycle = lifecycle.with_rng(rng);
        }

        let service = Self {
            store,
            registry,
            scheduler,
            lifecycle: Arc::new(lifecycle),
            announcer,
            clock,
            limits,
        };
        (service, fired)
    }

    // ── Administrative operations ──────────────────────────────────────────

    /// Validate, persist and arm a new giveaway, then announce it.
    #[instrument(skip(self, request), fields(guild_id = %request.guild_id))]
    pub async fn create(&self, request: CreateGiveaway) -> Result<Giveaway> {
        let now = self.clock.now();
        let prize = request.prize.trim();
        if prize.is_empty() {
            return Err(GiveawayError::InvalidRequest("prize must not be empty".into()));
        }
        if prize.chars().count() > self.limits.max_prize_len {
            return Err(GiveawayError::InvalidRequest(format!(
                "prize is longer than {} characters",
                self.limits.max_prize_len
            )));
        }
        if request.guild_id.trim().is_empty() || request.channel_id.trim().is_empty() {
            return Err(GiveawayError::InvalidRequest(
                "guild_id and channel_id are required".into(),
            ));
        }
        if request.end_time <= now {
            return Err(GiveawayError::InvalidRequest(
                "end time must be in the future".into(),
            ));
        }
        // Out-of-range limits saturate instead of overflowing.
        let earliest = i64::try_from(self.limits.min_duration_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|min| now.checked_add_signed(min))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let latest = i64::try_from(self.limits.max_duration_days)
            .ok()
            .and_then(ChronoDuration::try_days)
            .and_then(|max| now.checked_add_signed(max))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if request.end_time < earliest {
            return Err(GiveawayError::InvalidRequest(format!(
                "end time must be at least {}s in the future",
                self.limits.min_duration_secs
            )));
        }
        if request.end_time > latest {
            return Err(GiveawayError::InvalidRequest(format!(
                "end time must be within {} days",
                self.limits.max_duration_days
            )));
        }

        let giveaway = Giveaway {
            id: GiveawayId::new(),
            guild_id: request.guild_id,
            channel_id: request.channel_id,
            prize: prize.to_string(),
            created_by: request.created_by,
            created_at: now,
            end_time: request.end_time,
            status: GiveawayStatus::Active,
            winner_id: None,
            concluded_at: None,
        };
        self.store.create_event(&giveaway)?;
        self.scheduler.schedule(&giveaway.id, giveaway.end_time);
        info!(giveaway_id = %giveaway.id, prize = %giveaway.prize, ends_at = %giveaway.end_time, "giveaway created");

        best_effort("created", &giveaway.id, self.announcer.on_created(&giveaway)).await;
        Ok(giveaway)
    }

    /// Force-end a giveaway now. Same path as the deadline timer.
    pub async fn end(&self, id: &GiveawayId) -> Result<ConcludeOutcome> {
        self.lifecycle.conclude(id, ConcludeReason::ForceEnd).await
    }

    pub async fn reroll(&self, id: &GiveawayId) -> Result<String> {
        self.lifecycle.reroll(id).await
    }

    /// Active giveaways in `scope`, soonest deadline first.
    pub fn list(&self, scope: &Scope) -> Result<Vec<GiveawaySummary>> {
        self.store
            .active_events(Some(scope))?
            .into_iter()
            .map(|giveaway| self.summarize(giveaway))
            .collect()
    }

    pub fn info(&self, id: &GiveawayId) -> Result<GiveawaySummary> {
        let giveaway = self.store.get_event(id)?;
        self.summarize(giveaway)
    }

    pub async fn join(&self, id: &GiveawayId, participant_id: &str) -> Result<MembershipChange> {
        let change = self.registry.add(id, participant_id).await?;
        if change.changed {
            self.announce_count(id, change.count).await;
        }
        Ok(change)
    }

    pub async fn leave(&self, id: &GiveawayId, participant_id: &str) -> Result<MembershipChange> {
        let change = self.registry.remove(id, participant_id).await?;
        if change.changed {
            self.announce_count(id, change.count).await;
        }
        Ok(change)
    }

    /// The join/leave button: enter if absent, withdraw if present.
    pub async fn toggle(&self, id: &GiveawayId, participant_id: &str) -> Result<Toggled> {
        let toggled = self.registry.toggle(id, participant_id).await?;
        self.announce_count(id, toggled.count).await;
        Ok(toggled)
    }

    // ── Background work ────────────────────────────────────────────────────

    /// Rebuild timers from the store and finish anything missed while offline.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        RecoveryLoader::new(
            self.store.clone(),
            self.lifecycle.clone(),
            self.scheduler.clone(),
            self.clock.clone(),
        )
        .run()
        .await
    }

    /// Conclude giveaways as their timers fire, until `shutdown` flips to true.
    ///
    /// Each conclusion runs in its own task so a slow store write or announcer
    /// does not hold up other deadlines.
    pub async fn run_timers(
        self: Arc<Self>,
        mut fired: FiredTimers,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("giveaway timer dispatch started");
        loop {
            tokio::select! {
                next = fired.recv() => {
                    let Some(id) = next else { break };
                    let service = Arc::clone(&self);
                    tokio::spawn(async move { service.conclude_fired(id).await });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("giveaway timer dispatch stopped");
    }

    async fn conclude_fired(&self, id: GiveawayId) {
        match self.lifecycle.conclude(&id, ConcludeReason::Timeout).await {
            Ok(_) => {}
            Err(GiveawayError::StoreUnavailable(reason)) => {
                // The giveaway is left `concluding`; give it another timer so
                // it does not wait for a restart.
                let retry_at = self.clock.now() + ChronoDuration::seconds(FAILED_CONCLUSION_RETRY_SECS);
                warn!(giveaway_id = %id, error = %reason, %retry_at, "timed conclusion failed, re-arming");
                self.scheduler.schedule(&id, retry_at);
            }
            Err(e) => error!(giveaway_id = %id, error = %e, "timed conclusion failed"),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<ParticipantRegistry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    pub fn store(&self) -> &Arc<dyn GiveawayStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn summarize(&self, giveaway: Giveaway) -> Result<GiveawaySummary> {
        let participant_count = self.registry.count(&giveaway.id)?;
        Ok(GiveawaySummary {
            giveaway,
            participant_count,
        })
    }

    async fn announce_count(&self, id: &GiveawayId, count: usize) {
        match self.store.get_event(id) {
            Ok(giveaway) => {
                best_effort(
                    "participants_changed",
                    id,
                    self.announcer.on_participants_changed(&giveaway, count),
                )
                .await
            }
            Err(e) => warn!(giveaway_id = %id, error = %e, "cannot load giveaway for announcement"),
        }
    }
}
