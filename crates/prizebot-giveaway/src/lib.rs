//! `prizebot-giveaway`: time-boxed giveaways with a single idempotent
//! conclusion path.
//!
//! # Overview
//!
//! A giveaway is opened with a deadline, collects participants while
//! `active`, and is concluded exactly once, either by its deadline timer or
//! by an administrative "end". The store is the source of truth; the
//! in-memory [`Scheduler`] and [`ParticipantRegistry`] are rebuilt from it at
//! startup by the [`RecoveryLoader`].
//!
//! # States
//!
//! | Status       | Meaning                                              |
//! |--------------|------------------------------------------------------|
//! | `active`     | Accepting entries; a deadline timer is armed         |
//! | `concluding` | Claimed by a conclusion; only visible after a crash  |
//! | `concluded`  | Winner (or no-participant outcome) persisted         |
//!
//! Everything is wired together by [`GiveawayService`].

pub mod announce;
pub mod clock;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod recovery;
pub mod registry;
pub mod scheduler;
pub mod selection;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod types;

pub use announce::{AnnounceError, Announcer, LogAnnouncer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GiveawayError, Result};
pub use lifecycle::{LifecycleController, RetryPolicy};
pub use recovery::{RecoveryLoader, RecoveryReport};
pub use registry::ParticipantRegistry;
pub use scheduler::{FiredTimers, Scheduler};
pub use service::GiveawayService;
pub use sqlite::SqliteStore;
pub use store::GiveawayStore;
pub use types::{
    ConcludeOutcome, ConcludeReason, CreateGiveaway, DrawResult, Giveaway, GiveawayStatus,
    GiveawaySummary, MembershipChange, Scope, ToggleAction, Toggled,
};
