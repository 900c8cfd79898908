//! Announcer: outbound notifications about a giveaway's lifecycle.
//!
//! Every call is best-effort from the lifecycle's point of view: a failed
//! announcement is logged and never rolls back or blocks a state change.

use std::future::Future;

use async_trait::async_trait;
use prizebot_core::GiveawayId;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{DrawResult, Giveaway};

/// Errors an announcer adapter may report.
#[derive(Debug, Error)]
pub enum AnnounceError {
    /// The notification could not be rendered or delivered.
    #[error("render failed: {0}")]
    Render(String),
}

/// Renders creation / update / conclusion notifications for humans.
///
/// Implementations must be `Send + Sync` so one instance can be shared by the
/// lifecycle controller, the timer dispatch task and command handlers.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// A giveaway was opened.
    async fn on_created(&self, giveaway: &Giveaway) -> Result<(), AnnounceError>;

    /// Membership changed; `count` is the new participant total.
    async fn on_participants_changed(
        &self,
        giveaway: &Giveaway,
        count: usize,
    ) -> Result<(), AnnounceError>;

    /// The giveaway concluded, with or without a winner.
    async fn on_concluded(
        &self,
        giveaway: &Giveaway,
        result: &DrawResult,
    ) -> Result<(), AnnounceError>;

    /// A new winner was drawn for an already concluded giveaway.
    async fn on_rerolled(&self, giveaway: &Giveaway, winner_id: &str)
        -> Result<(), AnnounceError>;
}

/// Announcer that only writes structured log lines. Used when no delivery
/// target is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn on_created(&self, giveaway: &Giveaway) -> Result<(), AnnounceError> {
        info!(
            giveaway_id = %giveaway.id,
            guild_id = %giveaway.guild_id,
            channel_id = %giveaway.channel_id,
            prize = %giveaway.prize,
            ends_at = %giveaway.end_time,
            "giveaway started"
        );
        Ok(())
    }

    async fn on_participants_changed(
        &self,
        giveaway: &Giveaway,
        count: usize,
    ) -> Result<(), AnnounceError> {
        info!(giveaway_id = %giveaway.id, count, "giveaway entries updated");
        Ok(())
    }

    async fn on_concluded(
        &self,
        giveaway: &Giveaway,
        result: &DrawResult,
    ) -> Result<(), AnnounceError> {
        match result {
            DrawResult::Winner(winner) => {
                info!(giveaway_id = %giveaway.id, prize = %giveaway.prize, winner = %winner, "giveaway ended")
            }
            DrawResult::NoParticipants => {
                info!(giveaway_id = %giveaway.id, prize = %giveaway.prize, "giveaway ended with no entries")
            }
        }
        Ok(())
    }

    async fn on_rerolled(
        &self,
        giveaway: &Giveaway,
        winner_id: &str,
    ) -> Result<(), AnnounceError> {
        info!(giveaway_id = %giveaway.id, winner = %winner_id, "giveaway rerolled");
        Ok(())
    }
}

/// Await an announcement and log (rather than propagate) any failure.
pub(crate) async fn best_effort<F>(kind: &'static str, id: &GiveawayId, announcement: F)
where
    F: Future<Output = Result<(), AnnounceError>>,
{
    if let Err(e) = announcement.await {
        warn!(giveaway_id = %id, kind, error = %e, "announcement failed");
    }
}
