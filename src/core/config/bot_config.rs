// Bot configuration, read from environment variables.
//
// The lookup is injected so tests can feed a plain HashMap instead of
// mutating the process environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SNAPSHOT_PATH: &str = "data/leveling_data.json";
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_LEVELING_RATE: f64 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing {0} environment variable")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Settings for the leveling system.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelingConfig {
    pub enabled: bool,
    /// Channel that receives milestone announcements. Always set when enabled.
    pub channel_id: Option<u64>,
    /// Levels gained per experience point.
    pub rate: f64,
    pub snapshot_path: PathBuf,
    pub snapshot_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub leveling: LevelingConfig,
}

impl BotConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let enabled = match get("LEVELING_ENABLED") {
            Some(raw) => parse_bool("LEVELING_ENABLED", &raw)?,
            None => false,
        };

        let channel_id = match get("LEVELING_CHANNEL") {
            Some(raw) => Some(parse_channel_id(&raw)?),
            None if enabled => return Err(ConfigError::Missing("LEVELING_CHANNEL")),
            None => None,
        };

        let rate = match get("LEVELING_RATE") {
            Some(raw) => parse_rate(&raw)?,
            None => DEFAULT_LEVELING_RATE,
        };

        let snapshot_path = get("LEVELING_SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));

        let interval_secs = match get("LEVELING_SNAPSHOT_INTERVAL_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "LEVELING_SNAPSHOT_INTERVAL_SECS",
                        reason: format!("expected a positive number of seconds, got '{}'", raw),
                    })
                }
            },
            None => DEFAULT_SNAPSHOT_INTERVAL_SECS,
        };

        Ok(Self {
            token,
            leveling: LevelingConfig {
                enabled,
                channel_id,
                rate,
                snapshot_path,
                snapshot_interval: Duration::from_secs(interval_secs),
            },
        })
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("expected true or false, got '{}'", raw),
        }),
    }
}

fn parse_channel_id(raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(ConfigError::Invalid {
            key: "LEVELING_CHANNEL",
            reason: format!("expected a channel id, got '{}'", raw),
        }),
    }
}

fn parse_rate(raw: &str) -> Result<f64, ConfigError> {
    match raw.parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
        _ => Err(ConfigError::Invalid {
            key: "LEVELING_RATE",
            reason: format!("expected a positive number, got '{}'", raw),
        }),
    }
}
