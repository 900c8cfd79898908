use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use prizebot_core::GiveawayId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// Capacity of the fired-timer channel between timer tasks and the dispatcher.
const FIRED_CHANNEL_CAPACITY: usize = 256;

/// A live one-shot timer.
struct TimerHandle {
    /// Distinguishes this timer from a later replacement for the same id.
    generation: u64,
    fire_at: DateTime<Utc>,
    delay: Duration,
    task: JoinHandle<()>,
}

/// Receiving end of fired timers; drained by
/// [`GiveawayService::run_timers`](crate::service::GiveawayService::run_timers).
pub struct FiredTimers {
    rx: mpsc::Receiver<GiveawayId>,
}

impl FiredTimers {
    /// Wait for the next fired giveaway id. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<GiveawayId> {
        self.rx.recv().await
    }
}

/// Registry of one live deadline timer per active giveaway.
///
/// Timers are plain epoch delays (`end_time - now`) recomputed whenever a
/// giveaway is scheduled, so nothing ever re-fires on a calendar. On fire a
/// timer removes its own handle and forwards the id to [`FiredTimers`].
/// Handles are process-local; after a restart the recovery loader rebuilds them.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    timers: Arc<DashMap<GiveawayId, TimerHandle>>,
    fired_tx: mpsc::Sender<GiveawayId>,
    next_generation: AtomicU64,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, FiredTimers) {
        let (fired_tx, rx) = mpsc::channel(FIRED_CHANNEL_CAPACITY);
        let scheduler = Self {
            clock,
            timers: Arc::new(DashMap::new()),
            fired_tx,
            next_generation: AtomicU64::new(0),
        };
        (scheduler, FiredTimers { rx })
    }

    /// Arm a one-shot timer firing at `fire_at` and return its delay.
    ///
    /// The delay is `max(0, fire_at - now)`. Scheduling an id that already has
    /// a timer replaces it.
    pub fn schedule(&self, id: &GiveawayId, fire_at: DateTime<Utc>) -> Duration {
        let delay = (fire_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // The task waits until its handle is registered, otherwise a zero-delay
        // timer could fire before there is a handle to remove.
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let timers = Arc::clone(&self.timers);
        let fired_tx = self.fired_tx.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let _ = armed_rx.await;
            tokio::time::sleep(delay).await;
            timers.remove_if(&task_id, |_, h| h.generation == generation);
            info!(giveaway_id = %task_id, "giveaway timer fired");
            if fired_tx.send(task_id.clone()).await.is_err() {
                warn!(giveaway_id = %task_id, "timer dispatch closed, left for recovery");
            }
        });

        let handle = TimerHandle {
            generation,
            fire_at,
            delay,
            task,
        };
        if let Some(previous) = self.timers.insert(id.clone(), handle) {
            previous.task.abort();
            debug!(giveaway_id = %id, "replaced existing timer");
        }
        let _ = armed_tx.send(());

        info!(giveaway_id = %id, fire_at = %fire_at, delay_ms = delay.as_millis() as u64, "giveaway timer armed");
        delay
    }

    /// Disarm the timer for `id`. Returns whether a live handle was removed.
    ///
    /// Advisory only: a timer that has already fired is unaffected, and the
    /// lifecycle's conclusion guard is what prevents a double conclusion.
    pub fn cancel(&self, id: &GiveawayId) -> bool {
        match self.timers.remove(id) {
            Some((_, handle)) => {
                handle.task.abort();
                debug!(giveaway_id = %id, "giveaway timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, id: &GiveawayId) -> bool {
        self.timers.contains_key(id)
    }

    /// Delay computed when the live timer for `id` was armed.
    pub fn armed_delay(&self, id: &GiveawayId) -> Option<Duration> {
        self.timers.get(id).map(|h| h.delay)
    }

    pub fn fire_at(&self, id: &GiveawayId) -> Option<DateTime<Utc>> {
        self.timers.get(id).map(|h| h.fire_at)
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Abort every live timer.
    pub fn shutdown(&self) {
        let count = self.timers.len();
        self.timers.retain(|_, handle| {
            handle.task.abort();
            false
        });
        info!(count, "scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn scheduler() -> (Scheduler, FiredTimers, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (scheduler, fired) = Scheduler::new(clock.clone());
        (scheduler, fired, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_absolute_delay() {
        let (scheduler, mut fired, clock) = scheduler();
        let id = GiveawayId::from("g1");
        let delay = scheduler.schedule(&id, clock.now() + chrono::Duration::seconds(60));
        assert_eq!(delay, Duration::from_secs(60));
        assert!(scheduler.is_scheduled(&id));

        let start = tokio::time::Instant::now();
        assert_eq!(fired.recv().await, Some(id.clone()));
        assert!(start.elapsed() >= Duration::from_secs(60));
        // The handle is gone once fired.
        assert!(!scheduler.is_scheduled(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_fires_immediately() {
        let (scheduler, mut fired, clock) = scheduler();
        let id = GiveawayId::from("g1");
        let delay = scheduler.schedule(&id, clock.now() - chrono::Duration::seconds(5));
        assert_eq!(delay, Duration::ZERO);
        assert_eq!(fired.recv().await, Some(id));
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (scheduler, mut fired, clock) = scheduler();
        let a = GiveawayId::from("a");
        let b = GiveawayId::from("b");
        scheduler.schedule(&a, clock.now() + chrono::Duration::seconds(10));
        scheduler.schedule(&b, clock.now() + chrono::Duration::seconds(20));
        assert!(scheduler.cancel(&a));
        assert!(!scheduler.cancel(&a));
        // Only b arrives, even though a was due first.
        assert_eq!(fired.recv().await, Some(b));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_previous_timer() {
        let (scheduler, mut fired, clock) = scheduler();
        let id = GiveawayId::from("g1");
        scheduler.schedule(&id, clock.now() + chrono::Duration::seconds(10));
        scheduler.schedule(&id, clock.now() + chrono::Duration::seconds(30));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.armed_delay(&id), Some(Duration::from_secs(30)));

        let start = tokio::time::Instant::now();
        assert_eq!(fired.recv().await, Some(id.clone()));
        assert!(start.elapsed() >= Duration::from_secs(30));

        // Nothing else is pending.
        let extra = tokio::time::timeout(Duration::from_secs(120), fired.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_everything() {
        let (scheduler, mut fired, clock) = scheduler();
        for i in 0..3 {
            scheduler.schedule(
                &GiveawayId::from(format!("g{i}")),
                clock.now() + chrono::Duration::seconds(5),
            );
        }
        scheduler.shutdown();
        assert!(scheduler.is_empty());
        let extra = tokio::time::timeout(Duration::from_secs(60), fired.recv()).await;
        assert!(extra.is_err());
    }
}
