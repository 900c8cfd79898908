use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MIN_DURATION_SECS: u64 = 10;
pub const DEFAULT_MAX_DURATION_DAYS: u64 = 90;
pub const DEFAULT_MAX_PRIZE_LEN: usize = 256;
pub const DEFAULT_STORE_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_STORE_RETRY_BASE_MS: u64 = 250;
pub const DEFAULT_ANNOUNCER_TIMEOUT_SECS: u64 = 10;

/// Top-level config (prizebot.toml + PRIZEBOT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrizebotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub giveaways: GiveawaysConfig,
    #[serde(default)]
    pub announcer: AnnouncerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Limits and retry policy for the giveaway lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiveawaysConfig {
    /// Giveaways ending sooner than this after creation are rejected.
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: u64,
    /// Giveaways ending later than this after creation are rejected.
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: u64,
    /// Maximum length (in characters) of a prize description.
    #[serde(default = "default_max_prize_len")]
    pub max_prize_len: usize,
    /// How many times the conclusion write is attempted before giving up.
    /// The giveaway stays `concluding` and is finished by the next recovery run.
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,
    /// Base delay for exponential backoff between conclusion write attempts.
    #[serde(default = "default_store_retry_base_ms")]
    pub store_retry_base_ms: u64,
}

impl Default for GiveawaysConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
            max_duration_days: DEFAULT_MAX_DURATION_DAYS,
            max_prize_len: DEFAULT_MAX_PRIZE_LEN,
            store_retry_attempts: DEFAULT_STORE_RETRY_ATTEMPTS,
            store_retry_base_ms: DEFAULT_STORE_RETRY_BASE_MS,
        }
    }
}

/// Where creation/update/conclusion notifications are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncerConfig {
    /// Discord-compatible webhook URL. When unset, notifications are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_announcer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: DEFAULT_ANNOUNCER_TIMEOUT_SECS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_min_duration_secs() -> u64 {
    DEFAULT_MIN_DURATION_SECS
}
fn default_max_duration_days() -> u64 {
    DEFAULT_MAX_DURATION_DAYS
}
fn default_max_prize_len() -> usize {
    DEFAULT_MAX_PRIZE_LEN
}
fn default_store_retry_attempts() -> u32 {
    DEFAULT_STORE_RETRY_ATTEMPTS
}
fn default_store_retry_base_ms() -> u64 {
    DEFAULT_STORE_RETRY_BASE_MS
}
fn default_announcer_timeout_secs() -> u64 {
    DEFAULT_ANNOUNCER_TIMEOUT_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.prizebot/prizebot.db", home)
}

impl PrizebotConfig {
    /// Load config from a TOML file with PRIZEBOT_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `PRIZEBOT_GATEWAY__PORT=9000`
    /// or `PRIZEBOT_GIVEAWAYS__MIN_DURATION_SECS=30`. A missing file is not an
    /// error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PrizebotConfig = Figment::from(Serialized::defaults(PrizebotConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PRIZEBOT_").split("__"))
            .extract()
            .map_err(|e| crate::error::PrizebotError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.prizebot/prizebot.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = PrizebotConfig::load(Some("does-not-exist.toml")).unwrap();
            assert_eq!(config.gateway.port, DEFAULT_PORT);
            assert_eq!(config.giveaways.store_retry_attempts, DEFAULT_STORE_RETRY_ATTEMPTS);
            assert!(config.announcer.webhook_url.is_none());
            Ok(())
        });
    }

    #[test]
    fn file_values_and_env_overrides_merge() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "prizebot.toml",
                r#"
                [gateway]
                port = 9100

                [giveaways]
                min_duration_secs = 30
                "#,
            )?;
            jail.set_env("PRIZEBOT_GATEWAY__BIND", "0.0.0.0");
            jail.set_env("PRIZEBOT_GIVEAWAYS__MAX_PRIZE_LEN", "64");

            let config = PrizebotConfig::load(Some("prizebot.toml")).unwrap();
            assert_eq!(config.gateway.port, 9100);
            assert_eq!(config.gateway.bind, "0.0.0.0");
            assert_eq!(config.giveaways.min_duration_secs, 30);
            assert_eq!(config.giveaways.max_prize_len, 64);
            assert_eq!(config.giveaways.max_duration_days, DEFAULT_MAX_DURATION_DAYS);
            Ok(())
        });
    }
}
