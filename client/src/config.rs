//! Configuration for the sync coordinator.

use std::env;
use std::time::Duration;

/// Sync configuration, loadable from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period between scheduled sync cycles
    pub sync_interval: Duration,
    /// Upper bound on any single transport call
    pub request_timeout: Duration,
    /// How long a conflict waits for manual resolution before last-writer-wins
    pub conflict_grace_period: Duration,
    /// Whether last-writer-wins runs at all once the grace period expires
    pub auto_resolve_conflicts: bool,
    /// Maximum records per push request
    pub push_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            conflict_grace_period: Duration::from_secs(300),
            auto_resolve_conflicts: true,
            push_batch_size: 50,
        }
    }
}

impl SyncConfig {
    /// Load a `.env` file if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sync_interval = secs_var("TETHER_SYNC_INTERVAL_SECS")?.unwrap_or(defaults.sync_interval);
        if sync_interval.is_zero() {
            return Err(ConfigError::Invalid("TETHER_SYNC_INTERVAL_SECS"));
        }

        let request_timeout =
            secs_var("TETHER_REQUEST_TIMEOUT_SECS")?.unwrap_or(defaults.request_timeout);
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid("TETHER_REQUEST_TIMEOUT_SECS"));
        }

        let conflict_grace_period =
            secs_var("TETHER_CONFLICT_GRACE_SECS")?.unwrap_or(defaults.conflict_grace_period);

        let auto_resolve_conflicts = match env::var("TETHER_AUTO_RESOLVE") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid("TETHER_AUTO_RESOLVE"))?,
            Err(_) => defaults.auto_resolve_conflicts,
        };

        let push_batch_size = match env::var("TETHER_PUSH_BATCH_SIZE") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid("TETHER_PUSH_BATCH_SIZE"))?,
            Err(_) => defaults.push_batch_size,
        };

        Ok(Self {
            sync_interval,
            request_timeout,
            conflict_grace_period,
            auto_resolve_conflicts,
            push_batch_size,
        })
    }
}

fn secs_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}
