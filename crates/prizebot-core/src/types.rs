use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a giveaway (UUIDv7, so ids sort by creation time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GiveawayId(pub String);

impl GiveawayId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GiveawayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for GiveawayId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for GiveawayId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GiveawayId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
