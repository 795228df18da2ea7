//! Session credential stores.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{AuthError, SessionCredential};
use crate::config::Settings;

const SESSION_KEY: &str = "bgg:session:cookies";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self) -> Result<Option<SessionCredential>, AuthError>;
    async fn set(&self, credential: &SessionCredential, ttl: Duration) -> Result<(), AuthError>;
    async fn delete(&self) -> Result<(), AuthError>;
    fn backend(&self) -> &'static str;
}

/// Shared Redis backend. Expiry is handled by Redis itself.
#[derive(Clone)]
pub struct RedisSessionStore {
    manager: ConnectionManager,
    key: String,
}

impl fmt::Debug for RedisSessionStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RedisSessionStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl RedisSessionStore {
    /// Connect and verify the server answers `PING`.
    #[tracing::instrument(level = "debug", skip(url))]
    pub async fn connect(url: &str) -> Result<Self, AuthError> {
        let client = redis::Client::open(url).map_err(store_error("redis client open"))?;
        let probe = async {
            let mut manager = ConnectionManager::new(client)
                .await
                .map_err(store_error("redis connect"))?;
            let _: String = redis::cmd("PING")
                .query_async(&mut manager)
                .await
                .map_err(store_error("redis ping"))?;
            Ok::<_, AuthError>(manager)
        };
        let manager = tokio::time::timeout(PROBE_TIMEOUT, probe)
            .await
            .map_err(|_| AuthError::Store("redis liveness probe timed out".to_string()))??;
        Ok(Self {
            manager,
            key: SESSION_KEY.to_string(),
        })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self) -> Result<Option<SessionCredential>, AuthError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(store_error("redis get"))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<SessionCredential>(&raw) {
            Ok(credential) if !credential.is_expired() => Ok(Some(credential)),
            Ok(_) => Ok(None),
            Err(error) => {
                tracing::warn!("Discarding unreadable cached session: {}", error);
                Ok(None)
            }
        }
    }

    async fn set(&self, credential: &SessionCredential, ttl: Duration) -> Result<(), AuthError> {
        let payload =
            serde_json::to_string(credential).map_err(|error| AuthError::Store(error.to_string()))?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(&self.key, payload, ttl.as_secs().max(1))
            .await
            .map_err(store_error("redis set_ex"))?;
        Ok(())
    }

    async fn delete(&self) -> Result<(), AuthError> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .del(&self.key)
            .await
            .map_err(store_error("redis del"))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Process-local fallback. Expiry is checked against the wall clock on read.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    slot: Mutex<Option<SessionCredential>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<SessionCredential>>, AuthError> {
        self.slot
            .lock()
            .map_err(|_| AuthError::Store("in-memory session store poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self) -> Result<Option<SessionCredential>, AuthError> {
        let mut slot = self.lock()?;
        if slot.as_ref().is_some_and(SessionCredential::is_expired) {
            *slot = None;
        }
        Ok(slot.clone())
    }

    async fn set(&self, credential: &SessionCredential, ttl: Duration) -> Result<(), AuthError> {
        let mut stored = credential.clone();
        let horizon = chrono::Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        stored.expires_at = stored.expires_at.min(horizon);
        *self.lock()? = Some(stored);
        Ok(())
    }

    async fn delete(&self) -> Result<(), AuthError> {
        *self.lock()? = None;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Pick the Redis store when configured and reachable, else the in-memory one.
pub async fn build_session_store(settings: &Settings) -> Arc<dyn SessionStore> {
    let Some(url) = settings.session_redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set, caching sessions in memory");
        return Arc::new(InMemorySessionStore::new());
    };
    match RedisSessionStore::connect(url).await {
        Ok(store) => {
            tracing::info!("Caching sessions in Redis");
            Arc::new(store)
        }
        Err(error) => {
            tracing::warn!("Redis session store unavailable, falling back to memory: {}", error);
            Arc::new(InMemorySessionStore::new())
        }
    }
}

fn store_error(context: &'static str) -> impl Fn(redis::RedisError) -> AuthError {
    move |error| AuthError::Store(format!("{context}: {error}"))
}
