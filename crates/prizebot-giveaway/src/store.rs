use chrono::{DateTime, Utc};
use prizebot_core::GiveawayId;

use crate::error::Result;
use crate::types::{ConclusionClaim, Giveaway, MembershipChange, Scope};

/// Durable record of giveaways and their participants.
///
/// The store is the only source of truth that survives a restart; the
/// scheduler and registry are rebuilt from it. Every method is a single
/// atomic step with respect to the others.
pub trait GiveawayStore: Send + Sync {
    /// Persist a new giveaway and return its id.
    fn create_event(&self, giveaway: &Giveaway) -> Result<GiveawayId>;

    /// Fetch a giveaway, failing with `NotFound` for unknown ids.
    fn get_event(&self, id: &GiveawayId) -> Result<Giveaway>;

    /// All `active` giveaways, optionally restricted to a guild/channel,
    /// ordered by deadline.
    fn active_events(&self, scope: Option<&Scope>) -> Result<Vec<Giveaway>>;

    /// Giveaways left in `concluding` (crash mid-conclusion).
    fn concluding_events(&self) -> Result<Vec<Giveaway>>;

    /// Insert a participant if absent. Fails with `InvalidState` unless the
    /// giveaway is `active`, checked in the same step as the insert.
    fn add_participant(
        &self,
        id: &GiveawayId,
        participant_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<MembershipChange>;

    /// Remove a participant if present. Fails with `InvalidState` unless `active`.
    fn remove_participant(&self, id: &GiveawayId, participant_id: &str)
        -> Result<MembershipChange>;

    fn is_participant(&self, id: &GiveawayId, participant_id: &str) -> Result<bool>;

    /// Participant ids in join order.
    fn list_participants(&self, id: &GiveawayId) -> Result<Vec<String>>;

    fn participant_count(&self, id: &GiveawayId) -> Result<usize>;

    /// Compare-and-swap `active -> concluding`.
    fn begin_conclusion(&self, id: &GiveawayId) -> Result<ConclusionClaim>;

    /// Write the outcome, guarded by `status = concluding`.
    ///
    /// Returns `false` when the guard did not match and nothing was written.
    fn mark_concluded(
        &self,
        id: &GiveawayId,
        winner_id: Option<&str>,
        concluded_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Replace the winner of a concluded giveaway, guarded by `status = concluded`.
    fn set_winner(&self, id: &GiveawayId, winner_id: &str) -> Result<bool>;
}
