//! Fingerprint cache backends: Redis, the libSQL table, and process memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{FingerprintCache, FingerprintPhase};
use crate::config::Settings;
use crate::db::LibSqlFingerprintRepository;
use crate::services::DatabaseService;
use crate::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Durable backend shared across processes.
#[derive(Clone)]
pub struct RedisFingerprintCache {
    manager: ConnectionManager,
    prefix: String,
}

impl fmt::Debug for RedisFingerprintCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisFingerprintCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisFingerprintCache {
    #[tracing::instrument(level = "debug", skip(url))]
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(cache_error("redis client open"))?;
        let probe = async {
            let mut manager = ConnectionManager::new(client)
                .await
                .map_err(cache_error("redis connect"))?;
            let _: String = redis::cmd("PING")
                .query_async(&mut manager)
                .await
                .map_err(cache_error("redis ping"))?;
            Ok::<_, Error>(manager)
        };
        let manager = tokio::time::timeout(PROBE_TIMEOUT, probe)
            .await
            .map_err(|_| Error::Cache("redis liveness probe timed out".to_string()))??;
        Ok(Self {
            manager,
            prefix: prefix.trim_end_matches(':').to_string(),
        })
    }

    fn key(&self, scope: &str, phase: FingerprintPhase, entity_id: i64) -> String {
        format!("{}:{scope}:{phase}:{entity_id}", self.prefix)
    }
}

#[async_trait]
impl FingerprintCache for RedisFingerprintCache {
    async fn get(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
    ) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(self.key(scope, phase, entity_id))
            .await
            .map_err(cache_error("redis get"))
    }

    async fn set(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
        fingerprint: &str,
    ) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(self.key(scope, phase, entity_id), fingerprint)
            .await
            .map_err(cache_error("redis set"))?;
        Ok(())
    }

    async fn delete(&self, scope: &str, phase: FingerprintPhase, entity_id: i64) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .del(self.key(scope, phase, entity_id))
            .await
            .map_err(cache_error("redis del"))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Fingerprints kept next to the mirrored data.
#[derive(Debug, Clone)]
pub struct LibSqlFingerprintCache {
    db: DatabaseService,
}

impl LibSqlFingerprintCache {
    pub fn new(db: DatabaseService) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FingerprintCache for LibSqlFingerprintCache {
    async fn get(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
    ) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LibSqlFingerprintRepository::new(db.connection())
            .get(scope, phase.as_str(), entity_id)
            .await
    }

    async fn set(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
        fingerprint: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlFingerprintRepository::new(db.connection())
            .set(scope, phase.as_str(), entity_id, fingerprint)
            .await
    }

    async fn delete(&self, scope: &str, phase: FingerprintPhase, entity_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlFingerprintRepository::new(db.connection())
            .delete(scope, phase.as_str(), entity_id)
            .await
    }

    fn backend(&self) -> &'static str {
        "libsql"
    }
}

type MemoryKey = (String, FingerprintPhase, i64);

/// Volatile backend, mostly for tests.
#[derive(Debug, Default)]
pub struct InMemoryFingerprintCache {
    entries: Mutex<HashMap<MemoryKey, String>>,
}

impl InMemoryFingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<MemoryKey, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Cache("in-memory fingerprint cache poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FingerprintCache for InMemoryFingerprintCache {
    async fn get(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
    ) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .get(&(scope.to_string(), phase, entity_id))
            .cloned())
    }

    async fn set(
        &self,
        scope: &str,
        phase: FingerprintPhase,
        entity_id: i64,
        fingerprint: &str,
    ) -> Result<()> {
        self.lock()?
            .insert((scope.to_string(), phase, entity_id), fingerprint.to_string());
        Ok(())
    }

    async fn delete(&self, scope: &str, phase: FingerprintPhase, entity_id: i64) -> Result<()> {
        self.lock()?.remove(&(scope.to_string(), phase, entity_id));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Redis when `BGG_HASH_REDIS_URL` is set and answers, else the libSQL table.
pub async fn build_fingerprint_cache(
    settings: &Settings,
    db: &DatabaseService,
) -> Arc<dyn FingerprintCache> {
    let Some(url) = settings.hash_redis_url.as_deref() else {
        tracing::info!("BGG_HASH_REDIS_URL not set, storing fingerprints in the database");
        return Arc::new(LibSqlFingerprintCache::new(db.clone()));
    };
    match RedisFingerprintCache::connect(url, &settings.hash_redis_prefix).await {
        Ok(cache) => {
            tracing::info!(
                prefix = %settings.hash_redis_prefix,
                "Fingerprint cache connected to Redis"
            );
            Arc::new(cache)
        }
        Err(error) => {
            tracing::warn!(
                "Fingerprint cache Redis unavailable, falling back to the database: {}",
                error
            );
            Arc::new(LibSqlFingerprintCache::new(db.clone()))
        }
    }
}

fn cache_error(context: &'static str) -> impl Fn(redis::RedisError) -> Error {
    move |error| Error::Cache(format!("{context}: {error}"))
}
