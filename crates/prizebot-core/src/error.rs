use thiserror::Error;

/// Process-level failures outside the giveaway subsystem.
#[derive(Debug, Error)]
pub enum PrizebotError {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PrizebotError>;
