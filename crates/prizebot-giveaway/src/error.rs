use prizebot_core::GiveawayId;
use thiserror::Error;

use crate::types::GiveawayStatus;

/// Errors surfaced by the giveaway subsystem.
///
/// A duplicate conclusion is not an error; see
/// [`ConcludeOutcome::AlreadyConcluded`](crate::types::ConcludeOutcome::AlreadyConcluded).
#[derive(Debug, Error)]
pub enum GiveawayError {
    /// No giveaway with the given ID exists in the store.
    #[error("giveaway not found: {id}")]
    NotFound { id: GiveawayId },

    /// The operation needs a different lifecycle state (e.g. joining after the draw).
    #[error("giveaway {id} is {status}")]
    InvalidState {
        id: GiveawayId,
        status: GiveawayStatus,
    },

    /// A reroll was requested for a giveaway nobody entered.
    #[error("giveaway {id} has no participants")]
    NoParticipants { id: GiveawayId },

    /// The creation request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The durable store could not be read or written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl GiveawayError {
    /// Short error code string returned to command callers.
    pub fn code(&self) -> &'static str {
        match self {
            GiveawayError::NotFound { .. } => "NOT_FOUND",
            GiveawayError::InvalidState { .. } => "INVALID_STATE",
            GiveawayError::NoParticipants { .. } => "NO_PARTICIPANTS",
            GiveawayError::InvalidRequest(_) => "INVALID_REQUEST",
            GiveawayError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl From<rusqlite::Error> for GiveawayError {
    fn from(e: rusqlite::Error) -> Self {
        GiveawayError::StoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GiveawayError>;
