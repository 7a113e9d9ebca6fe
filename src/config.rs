use crate::domain::Money;
use crate::engine::{FeePolicy, PayoutPolicy};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Percentage of each tip that goes to the artist pool.
    pub artist_share_percent: u8,
    pub first_payout_threshold: Money,
    pub payout_increment: Money,
    pub min_payout: Money,
    /// Default page size for escrow history.
    pub history_limit: i64,
    /// Upper bound on time spent retrying SQLite busy/locked errors.
    pub contention_retry_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let artist_share_percent = env_map
            .get("ARTIST_SHARE_PERCENT")
            .map(|s| s.as_str())
            .unwrap_or("70")
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "ARTIST_SHARE_PERCENT".to_string(),
                    "must be an integer between 0 and 100".to_string(),
                )
            })?;

        let first_payout_threshold =
            parse_pence(&env_map, "FIRST_PAYOUT_THRESHOLD_PENCE", "3300")?;
        let payout_increment = parse_pence(&env_map, "PAYOUT_INCREMENT_PENCE", "1000")?;
        let min_payout = parse_pence(&env_map, "MIN_PAYOUT_PENCE", "100")?;

        let history_limit = env_map
            .get("HISTORY_LIMIT")
            .map(|s| s.as_str())
            .unwrap_or("50")
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "HISTORY_LIMIT".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let contention_retry_ms = env_map
            .get("CONTENTION_RETRY_MS")
            .map(|s| s.as_str())
            .unwrap_or("2000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CONTENTION_RETRY_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            artist_share_percent,
            first_payout_threshold,
            payout_increment,
            min_payout,
            history_limit,
            contention_retry_ms,
        })
    }

    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy::new(self.artist_share_percent)
    }

    pub fn payout_policy(&self) -> PayoutPolicy {
        PayoutPolicy {
            first_payout_threshold: self.first_payout_threshold,
            payout_increment: self.payout_increment,
            min_payout: self.min_payout,
        }
    }

    pub fn contention_retry_window(&self) -> Duration {
        Duration::from_millis(self.contention_retry_ms)
    }
}

fn parse_pence(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Money, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<i64>()
        .ok()
        .and_then(|v| Money::try_new(v).ok())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                key.to_string(),
                "must be a non-negative integer number of pence".to_string(),
            )
        })
}
