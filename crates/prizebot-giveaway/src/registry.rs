use std::sync::Arc;

use dashmap::DashMap;
use prizebot_core::GiveawayId;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{GiveawayError, Result};
use crate::store::GiveawayStore;
use crate::types::{MembershipChange, ToggleAction, Toggled};

/// Per-giveaway participant membership, backed by the store.
///
/// Mutations for the same giveaway are serialized through a per-giveaway
/// async lock so a burst of join/leave clicks cannot interleave a toggle's
/// read and write. The store re-checks `status = active` on every write.
pub struct ParticipantRegistry {
    store: Arc<dyn GiveawayStore>,
    clock: Arc<dyn Clock>,
    locks: DashMap<GiveawayId, Arc<Mutex<()>>>,
}

impl ParticipantRegistry {
    pub fn new(store: Arc<dyn GiveawayStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: DashMap::new(),
        }
    }

    /// Run `op` under the giveaway's mutation lock.
    ///
    /// A rejected mutation (unknown id, or a giveaway that is no longer
    /// active) drops the lock entry again unless another caller holds it, so
    /// the map only keeps entries for live giveaways.
    async fn locked<T>(&self, id: &GiveawayId, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = Arc::clone(self.locks.entry(id.clone()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            op()
        };
        if matches!(
            result,
            Err(GiveawayError::NotFound { .. } | GiveawayError::InvalidState { .. })
        ) {
            // Held by the map and by us only.
            self.locks.remove_if(id, |_, held| Arc::strong_count(held) == 2);
        }
        result
    }

    /// Add a participant. Idempotent; fails with `InvalidState` unless active.
    pub async fn add(&self, id: &GiveawayId, participant_id: &str) -> Result<MembershipChange> {
        self.locked(id, || {
            self.store
                .add_participant(id, participant_id, self.clock.now())
        })
        .await
    }

    /// Remove a participant. Idempotent; fails with `InvalidState` unless active.
    pub async fn remove(&self, id: &GiveawayId, participant_id: &str) -> Result<MembershipChange> {
        self.locked(id, || self.store.remove_participant(id, participant_id))
            .await
    }

    /// Join if absent, leave if present.
    pub async fn toggle(&self, id: &GiveawayId, participant_id: &str) -> Result<Toggled> {
        let toggled = self
            .locked(id, || {
                if self.store.is_participant(id, participant_id)? {
                    let change = self.store.remove_participant(id, participant_id)?;
                    Ok(Toggled {
                        action: ToggleAction::Left,
                        count: change.count,
                    })
                } else {
                    let change = self
                        .store
                        .add_participant(id, participant_id, self.clock.now())?;
                    Ok(Toggled {
                        action: ToggleAction::Joined,
                        count: change.count,
                    })
                }
            })
            .await?;
        debug!(giveaway_id = %id, action = ?toggled.action, count = toggled.count, "toggled entry");
        Ok(toggled)
    }

    /// Current participants in join order.
    pub fn participants(&self, id: &GiveawayId) -> Result<Vec<String>> {
        self.store.list_participants(id)
    }

    pub fn count(&self, id: &GiveawayId) -> Result<usize> {
        self.store.participant_count(id)
    }

    /// Drop the mutation lock of a giveaway that can no longer change.
    pub fn release(&self, id: &GiveawayId) {
        self.locks.remove(id);
    }
}
