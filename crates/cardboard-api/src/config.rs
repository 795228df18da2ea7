use std::collections::HashMap;
use std::env;
use std::time::Duration;

use cardboard_core::SyncTarget;
use thiserror::Error;

const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3_600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server-only settings. Everything about syncing lives in `cardboard_core::Settings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub schedule: Schedule,
}

/// Periodic trigger interval per target; `None` disables the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub collection: Option<Duration>,
    pub accessories: Option<Duration>,
    pub hotness: Option<Duration>,
    pub plays: Option<Duration>,
}

impl Schedule {
    pub fn interval(&self, target: SyncTarget) -> Option<Duration> {
        match target {
            SyncTarget::Collection => self.collection,
            SyncTarget::Accessories => self.accessories,
            SyncTarget::Hotness => self.hotness,
            SyncTarget::Plays => self.plays,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "CARDBOARD_API_BIND_ADDR", "127.0.0.1:8080");
        let schedule = Schedule {
            collection: interval(&lookup, "CARDBOARD_SCHEDULE_COLLECTION_SECS", 7_200)?,
            accessories: interval(&lookup, "CARDBOARD_SCHEDULE_ACCESSORIES_SECS", 21_600)?,
            hotness: interval(&lookup, "CARDBOARD_SCHEDULE_HOTNESS_SECS", 3_600)?,
            plays: interval(&lookup, "CARDBOARD_SCHEDULE_PLAYS_SECS", 21_600)?,
        };
        Ok(Self {
            bind_addr,
            schedule,
        })
    }
}

/// Seconds between runs, `0` disables.
fn interval(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<Option<Duration>, ConfigError> {
    let secs = value_or_default(lookup, name, &default.to_string())
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!("{name} must be an integer in [0, {MAX_INTERVAL_SECS}]"))
        })?;
    if secs > MAX_INTERVAL_SECS {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [0, {MAX_INTERVAL_SECS}]"
        )));
    }
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
