//! Logged-in session handling for private endpoints.

mod manager;
mod store;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::TransportError;

pub use manager::SessionManager;
pub use store::{build_session_store, InMemorySessionStore, RedisSessionStore, SessionStore};

/// Cookie that must be present after a successful login.
pub const SESSION_COOKIE: &str = "SessionID";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Login credentials are not configured (set BGG_USERNAME and BGG_PASSWORD)")]
    NotConfigured,
    #[error("Login failed: {0}")]
    LoginFailed(String),
    #[error("Login succeeded but the SessionID cookie is missing")]
    MissingSessionToken,
    #[error("Login request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Session store error: {0}")]
    Store(String),
}

/// Cookies obtained from a login, replaced as a whole and never edited.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub tokens: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionCredential {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionCredential")
            .field("tokens", &self.tokens.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_redacts_values() {
        let credential = SessionCredential {
            tokens: BTreeMap::from([(SESSION_COOKIE.to_string(), "secret-cookie".to_string())]),
            expires_at: Utc::now(),
        };
        let rendered = format!("{credential:?}");
        assert!(rendered.contains(SESSION_COOKIE));
        assert!(!rendered.contains("secret-cookie"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
