//! Content fingerprints used to skip unchanged remote entities.
//!
//! A fingerprint is the SHA-256 of a canonical JSON rendering of a payload:
//! object keys sorted at every depth, timestamps rewritten to UTC ISO-8601.
//! Two fingerprints per entity are tracked, one over the cheap list row and one
//! over the assembled detail record.

mod backends;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::Result;

pub use backends::{
    build_fingerprint_cache, InMemoryFingerprintCache, LibSqlFingerprintCache,
    RedisFingerprintCache,
};

/// Which payload a fingerprint was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintPhase {
    /// The list row
    List,
    /// The assembled detail record
    Detail,
}

impl FingerprintPhase {
    pub const ALL: [Self; 2] = [Self::List, Self::Detail];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "collection",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for FingerprintPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex SHA-256 over the canonical form of `payload`.
pub fn fingerprint<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    let canonical = canonicalize(serde_json::to_value(payload)?);
    let encoded = serde_json::to_string(&canonical)?;
    let digest = Sha256::digest(encoded.as_bytes());
    Ok(format!("{digest:x}"))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::String(text) => Value::String(normalize_timestamp(&text).unwrap_or(text)),
        other => other,
    }
}

/// Rewrite RFC 3339 and `YYYY-MM-DD HH:MM:SS` stamps as UTC `...Z`.
fn normalize_timestamp(text: &str) -> Option<String> {
    if text.len() < 19 || !text.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        );
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Storage for the last-seen fingerprint of each `(scope, phase, id)`.
#[async_trait::async_trait]
pub trait FingerprintCache: Send + Sync {
    async fn get(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
    ) -> Result<Option<String>>;
    async fn set(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
        fingerprint: &str,
    ) -> Result<()>;
    async fn delete(&self, scope: &str, phase: FingerprintPhase, entity_id: i64) -> Result<()>;
    fn backend(&self) -> &'static str;
}

/// A cache bound to one pipeline. Backend errors are logged and read as misses.
#[derive(Clone)]
pub struct ScopedFingerprints {
    cache: Arc<dyn FingerprintCache>,
    scope: &'static str,
}

impl fmt::Debug for ScopedFingerprints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedFingerprints")
            .field("backend", &self.cache.backend())
            .field("scope", &self.scope)
            .finish()
    }
}

impl ScopedFingerprints {
    pub fn new(cache: Arc<dyn FingerprintCache>, scope: &'static str) -> Self {
        Self { cache, scope }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub async fn lookup(&self, phase: FingerprintPhase, entity_id: i64) -> Option<String> {
        match self.cache.get(self.scope, phase, entity_id).await {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(
                    scope = self.scope,
                    %phase,
                    entity_id,
                    "Fingerprint lookup failed, treating as miss: {}",
                    error
                );
                None
            }
        }
    }

    pub async fn store(&self, phase: FingerprintPhase, entity_id: i64, fingerprint: &str) {
        if let Err(error) = self.cache.set(self.scope, phase, entity_id, fingerprint).await {
            tracing::warn!(
                scope = self.scope,
                %phase,
                entity_id,
                "Failed to store fingerprint: {}",
                error
            );
        }
    }

    /// Drop both fingerprints of a deleted entity.
    pub async fn forget(&self, entity_id: i64) {
        for phase in FingerprintPhase::ALL {
            if let Err(error) = self.cache.delete(self.scope, phase, entity_id).await {
                tracing::warn!(
                    scope = self.scope,
                    %phase,
                    entity_id,
                    "Failed to delete fingerprint: {}",
                    error
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_ignores_key_order() {
        let left = json!({"id": 1, "name": "Azul", "stats": {"rank": 3, "plays": 2}});
        let right = json!({"stats": {"plays": 2, "rank": 3}, "name": "Azul", "id": 1});
        assert_eq!(fingerprint(&left).unwrap(), fingerprint(&right).unwrap());
    }

    #[test]
    fn fingerprint_changes_with_any_field() {
        let base = json!({"id": 1, "name": "Azul", "plays": 2});
        let changed = json!({"id": 1, "name": "Azul", "plays": 3});
        assert_ne!(fingerprint(&base).unwrap(), fingerprint(&changed).unwrap());
    }

    #[test]
    fn fingerprint_normalizes_timestamps_to_utc() {
        let offset = json!({"modified": "2026-01-02T12:00:00+02:00"});
        let utc = json!({"modified": "2026-01-02T10:00:00Z"});
        let naive = json!({"modified": "2026-01-02 10:00:00"});
        let expected = fingerprint(&utc).unwrap();
        assert_eq!(fingerprint(&offset).unwrap(), expected);
        assert_eq!(fingerprint(&naive).unwrap(), expected);
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let value = fingerprint(&json!({"id": 1})).unwrap();
        assert_eq!(value.len(), 64);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn array_order_is_significant() {
        let left = json!({"mechanics": ["A", "B"]});
        let right = json!({"mechanics": ["B", "A"]});
        assert_ne!(fingerprint(&left).unwrap(), fingerprint(&right).unwrap());
    }

    #[tokio::test]
    async fn scoped_forget_removes_both_phases() {
        let cache: Arc<dyn FingerprintCache> = Arc::new(InMemoryFingerprintCache::new());
        let games = ScopedFingerprints::new(cache.clone(), "games");
        let hot = ScopedFingerprints::new(cache, "hot");

        games.store(FingerprintPhase::List, 1, "l").await;
        games.store(FingerprintPhase::Detail, 1, "d").await;
        hot.store(FingerprintPhase::Detail, 1, "h").await;

        games.forget(1).await;
        assert_eq!(games.lookup(FingerprintPhase::List, 1).await, None);
        assert_eq!(games.lookup(FingerprintPhase::Detail, 1).await, None);
        assert_eq!(
            hot.lookup(FingerprintPhase::Detail, 1).await.as_deref(),
            Some("h")
        );
    }
}
