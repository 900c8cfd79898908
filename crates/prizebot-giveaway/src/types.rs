use chrono::{DateTime, Utc};
use prizebot_core::GiveawayId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a giveaway.
///
/// `Active -> Concluding -> Concluded`; both transitions happen exactly once.
/// `Concluding` is a transient guard state and only survives a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiveawayStatus {
    /// Open for participation; a timer is armed for `end_time`.
    Active,
    /// A conclusion has been claimed but not yet persisted.
    Concluding,
    /// Winner (or lack of one) persisted. Terminal.
    Concluded,
}

impl std::fmt::Display for GiveawayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GiveawayStatus::Active => "active",
            GiveawayStatus::Concluding => "concluding",
            GiveawayStatus::Concluded => "concluded",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for GiveawayStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(GiveawayStatus::Active),
            "concluding" => Ok(GiveawayStatus::Concluding),
            "concluded" => Ok(GiveawayStatus::Concluded),
            other => Err(format!("unknown giveaway status: {other}")),
        }
    }
}

/// A persisted giveaway record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Giveaway {
    pub id: GiveawayId,
    pub guild_id: String,
    pub channel_id: String,
    /// Free-text prize description.
    pub prize: String,
    /// Identifier of the member who created the giveaway.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Deadline; always later than `created_at`.
    pub end_time: DateTime<Utc>,
    pub status: GiveawayStatus,
    /// Set only once concluded with at least one participant.
    pub winner_id: Option<String>,
    /// Set exactly once, at the first successful conclusion.
    pub concluded_at: Option<DateTime<Utc>>,
}

/// Guild (and optionally channel) filter for listing giveaways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub guild_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl Scope {
    pub fn guild(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: None,
        }
    }

    pub fn channel(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: Some(channel_id.into()),
        }
    }
}

/// Administrative request to open a new giveaway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGiveaway {
    pub guild_id: String,
    pub channel_id: String,
    pub prize: String,
    pub created_by: String,
    pub end_time: DateTime<Utc>,
}

/// A giveaway together with its current participant count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiveawaySummary {
    #[serde(flatten)]
    pub giveaway: Giveaway,
    pub participant_count: usize,
}

/// What triggered a conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcludeReason {
    /// The deadline timer fired (or was found overdue at startup).
    Timeout,
    /// An administrator ended the giveaway early.
    ForceEnd,
}

impl std::fmt::Display for ConcludeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcludeReason::Timeout => write!(f, "timeout"),
            ConcludeReason::ForceEnd => write!(f, "force_end"),
        }
    }
}

/// Result of a `conclude` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "winner_id", rename_all = "snake_case")]
pub enum ConcludeOutcome {
    /// This caller concluded the giveaway and drew the given winner.
    Winner(String),
    /// This caller concluded the giveaway; nobody had entered.
    NoParticipants,
    /// Someone else already concluded (or is concluding) the giveaway. No side effects.
    AlreadyConcluded,
}

/// The draw result handed to the announcer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawResult {
    Winner(String),
    NoParticipants,
}

impl DrawResult {
    pub fn winner_id(&self) -> Option<&str> {
        match self {
            DrawResult::Winner(w) => Some(w),
            DrawResult::NoParticipants => None,
        }
    }
}

/// What the store reports when a caller tries to move a giveaway out of `Active`.
#[derive(Debug, Clone)]
pub enum ConclusionClaim {
    /// This caller flipped `active -> concluding`.
    Claimed(Giveaway),
    /// The giveaway was already `concluding` (left behind by a crash).
    Stranded(Giveaway),
    /// The giveaway is already `concluded`.
    Finished(Giveaway),
}

/// Membership after an add/remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    /// False when the call was a no-op (already a member / not a member).
    pub changed: bool,
    /// Resulting number of participants.
    pub count: usize,
}

/// Which branch a join/leave toggle took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Joined,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggled {
    pub action: ToggleAction,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in [
            GiveawayStatus::Active,
            GiveawayStatus::Concluding,
            GiveawayStatus::Concluded,
        ] {
            assert_eq!(status.to_string().parse::<GiveawayStatus>().unwrap(), status);
        }
        assert!("finished".parse::<GiveawayStatus>().is_err());
    }
}
