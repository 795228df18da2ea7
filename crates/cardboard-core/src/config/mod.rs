//! Runtime settings for the sync engine.
//!
//! Settings come from the process environment. Parsing goes through
//! [`Settings::from_lookup`] so it can be exercised without touching the
//! real environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::http::RetryPolicy;
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_BASE_URL: &str = "https://boardgamegeek.com";
const DEFAULT_DATABASE_PATH: &str = "cardboard.db";
const DEFAULT_HASH_PREFIX: &str = "bgg_game_hash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when the list endpoint returns zero entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptySnapshotPolicy {
    /// Treat the snapshot as suspicious: change nothing.
    #[default]
    Skip,
    /// Trust the snapshot and delete everything in scope.
    Reconcile,
}

/// Login credentials for private endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Remote endpoint locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base_url: String,
    pub login_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let login_url = format!("{base_url}/login/api/v1");
        Self {
            base_url,
            login_url,
        }
    }

    pub fn collection(&self) -> String {
        format!("{}/xmlapi2/collection", self.base_url)
    }

    pub fn thing(&self) -> String {
        format!("{}/xmlapi2/thing", self.base_url)
    }

    pub fn hot(&self) -> String {
        format!("{}/xmlapi2/hot", self.base_url)
    }

    pub fn private_collection(&self) -> String {
        format!("{}/api/collections", self.base_url)
    }

    pub fn plays(&self) -> String {
        format!("{}/geekplay.php", self.base_url)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Knobs for the detail orchestrator and the plays sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub detail_concurrency: usize,
    pub plays_concurrency: usize,
    pub plays_page_size: usize,
    pub plays_max_pages: usize,
    pub fetch_private_fields: bool,
    pub default_currency: Option<String>,
    pub empty_snapshot: EmptySnapshotPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            detail_concurrency: 2,
            plays_concurrency: 1,
            plays_page_size: 600,
            plays_max_pages: 200,
            fetch_private_fields: false,
            default_currency: None,
            empty_snapshot: EmptySnapshotPolicy::Skip,
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub collection_user: Option<String>,
    pub credentials: Option<LoginCredentials>,
    pub endpoints: Endpoints,
    pub session_ttl: Duration,
    pub session_redis_url: Option<String>,
    pub hash_redis_url: Option<String>,
    pub hash_redis_prefix: String,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub sync: SyncOptions,
}

impl fmt::Debug for Settings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Settings")
            .field("database_path", &self.database_path)
            .field("collection_user", &self.collection_user)
            .field("credentials", &self.credentials)
            .field("endpoints", &self.endpoints)
            .field("session_ttl", &self.session_ttl)
            .field(
                "session_redis_url",
                &self.session_redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "hash_redis_url",
                &self.hash_redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("hash_redis_prefix", &self.hash_redis_prefix)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .field("sync", &self.sync)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_path = PathBuf::from(value_or_default(
            &lookup,
            "CARDBOARD_DATABASE_PATH",
            DEFAULT_DATABASE_PATH,
        ));

        let base_url = value_or_default(&lookup, "BGG_BASE_URL", DEFAULT_BASE_URL);
        if !is_http_url(&base_url) {
            return Err(ConfigError::Invalid(
                "BGG_BASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let mut endpoints = Endpoints::new(base_url);
        if let Some(login_url) = optional_trimmed(&lookup, "BGG_LOGIN_URL") {
            if !is_http_url(&login_url) {
                return Err(ConfigError::Invalid(
                    "BGG_LOGIN_URL must start with http:// or https://".to_string(),
                ));
            }
            endpoints.login_url = login_url;
        }

        let login_user = optional_trimmed(&lookup, "BGG_USERNAME");
        let password = optional_trimmed(&lookup, "BGG_PASSWORD");
        let credentials = match (login_user.clone(), password) {
            (Some(username), Some(password)) => Some(LoginCredentials { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingVar("BGG_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::MissingVar("BGG_USERNAME")),
        };
        let collection_user = optional_trimmed(&lookup, "BGG_COLLECTION_USER").or(login_user);

        let session_ttl_secs = parse_ranged(
            &lookup,
            "BGG_SESSION_CACHE_TTL_SECONDS",
            28_800,
            60..=604_800,
        )?;

        let session_redis_url = optional_trimmed(&lookup, "REDIS_URL");
        let hash_redis_url = optional_trimmed(&lookup, "BGG_HASH_REDIS_URL");
        let hash_redis_prefix =
            value_or_default(&lookup, "BGG_HASH_REDIS_PREFIX", DEFAULT_HASH_PREFIX);

        let user_agent = value_or_default(
            &lookup,
            "USER_AGENT",
            concat!("cardboard/", env!("CARGO_PKG_VERSION")),
        );

        let max_attempts = parse_ranged(&lookup, "BGG_MAX_ATTEMPTS", 12, 1..=50)?;
        let pacing_ms = parse_ranged(&lookup, "BGG_PACING_MS", 2_000, 0..=60_000)?;
        let pacing_jitter_ms = parse_ranged(&lookup, "BGG_PACING_JITTER_MS", 500, 0..=10_000)?;
        let retry = RetryPolicy {
            max_attempts: max_attempts as u32,
            pacing: Duration::from_millis(pacing_ms),
            pacing_jitter: Duration::from_millis(pacing_jitter_ms),
            ..RetryPolicy::default()
        };

        let detail_concurrency = parse_ranged(&lookup, "BGG_DETAIL_CONCURRENCY", 2, 1..=8)?;
        let plays_concurrency = parse_ranged(&lookup, "BGG_PLAYS_CONCURRENCY", 1, 1..=8)?;
        let plays_page_size = parse_ranged(&lookup, "BGG_PLAYS_SHOWCOUNT", 600, 1..=1_000)?;
        let plays_max_pages = parse_ranged(&lookup, "BGG_PLAYS_MAX_PAGES", 200, 1..=1_000)?;

        let fetch_private_fields = match optional_trimmed(&lookup, "BGG_PRIVATE_FIELDS") {
            Some(raw) => parse_bool("BGG_PRIVATE_FIELDS", &raw)?,
            None => credentials.is_some(),
        };
        if fetch_private_fields && credentials.is_none() {
            return Err(ConfigError::Invalid(
                "BGG_PRIVATE_FIELDS requires BGG_USERNAME and BGG_PASSWORD".to_string(),
            ));
        }

        let empty_snapshot = match optional_trimmed(&lookup, "BGG_EMPTY_SNAPSHOT")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("skip") => EmptySnapshotPolicy::Skip,
            Some("reconcile") => EmptySnapshotPolicy::Reconcile,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "BGG_EMPTY_SNAPSHOT must be `skip` or `reconcile`, got `{other}`"
                )))
            }
        };

        Ok(Self {
            database_path,
            collection_user,
            credentials,
            endpoints,
            session_ttl: Duration::from_secs(session_ttl_secs),
            session_redis_url,
            hash_redis_url,
            hash_redis_prefix,
            user_agent,
            retry,
            sync: SyncOptions {
                detail_concurrency: detail_concurrency as usize,
                plays_concurrency: plays_concurrency as usize,
                plays_page_size: plays_page_size as usize,
                plays_max_pages: plays_max_pages as usize,
                fetch_private_fields,
                default_currency: optional_trimmed(&lookup, "BGG_DEFAULT_CURRENCY")
                    .map(|currency| currency.to_ascii_uppercase()),
                empty_snapshot,
            },
        })
    }

    /// The identity whose collection is mirrored.
    pub fn require_collection_user(&self) -> Result<&str, ConfigError> {
        self.collection_user
            .as_deref()
            .ok_or(ConfigError::MissingVar("BGG_COLLECTION_USER"))
    }
}

fn parse_ranged(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    crate::convert::to_bool(Some(raw))
        .ok_or_else(|| ConfigError::Invalid(format!("{name} must be a boolean (1/0, true/false)")))
}

pub(crate) fn value_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

pub(crate) fn optional_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<String> {
    normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        Settings::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_without_environment() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.database_path, PathBuf::from("cardboard.db"));
        assert_eq!(settings.endpoints.base_url, "https://boardgamegeek.com");
        assert_eq!(
            settings.endpoints.login_url,
            "https://boardgamegeek.com/login/api/v1"
        );
        assert_eq!(settings.retry.max_attempts, 12);
        assert_eq!(settings.sync.detail_concurrency, 2);
        assert_eq!(settings.sync.empty_snapshot, EmptySnapshotPolicy::Skip);
        assert!(!settings.sync.fetch_private_fields);
        assert!(settings.require_collection_user().is_err());
    }

    #[test]
    fn credentials_enable_private_fields_and_collection_user() {
        let settings =
            settings_from(&[("BGG_USERNAME", "qubus"), ("BGG_PASSWORD", "hunter2")]).unwrap();
        assert!(settings.sync.fetch_private_fields);
        assert_eq!(settings.require_collection_user().unwrap(), "qubus");
    }

    #[test]
    fn half_configured_credentials_are_rejected() {
        let err = settings_from(&[("BGG_USERNAME", "qubus")]).unwrap_err();
        assert!(err.to_string().contains("BGG_PASSWORD"));
    }

    #[test]
    fn private_fields_require_credentials() {
        let err = settings_from(&[("BGG_PRIVATE_FIELDS", "true")]).unwrap_err();
        assert!(err.to_string().contains("BGG_PRIVATE_FIELDS"));
    }

    #[test]
    fn out_of_range_concurrency_is_rejected() {
        let err = settings_from(&[("BGG_DETAIL_CONCURRENCY", "64")]).unwrap_err();
        assert!(err.to_string().contains("BGG_DETAIL_CONCURRENCY"));
    }

    #[test]
    fn empty_snapshot_policy_parses() {
        let settings = settings_from(&[("BGG_EMPTY_SNAPSHOT", "Reconcile")]).unwrap();
        assert_eq!(settings.sync.empty_snapshot, EmptySnapshotPolicy::Reconcile);
        assert!(settings_from(&[("BGG_EMPTY_SNAPSHOT", "wipe")]).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let settings = settings_from(&[
            ("BGG_USERNAME", "qubus"),
            ("BGG_PASSWORD", "sensitive-password"),
            ("REDIS_URL", "redis://:sensitive-redis@localhost"),
        ])
        .unwrap();
        let debug_output = format!("{settings:?}");
        assert!(!debug_output.contains("sensitive-password"));
        assert!(!debug_output.contains("sensitive-redis"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
