pub mod config;
pub mod error;
pub mod types;

pub use config::PrizebotConfig;
pub use error::{PrizebotError, Result};
pub use types::GiveawayId;
