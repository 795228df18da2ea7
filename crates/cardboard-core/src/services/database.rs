//! Shared database service wrapper used by the engine and both binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::db::{
    CollectionRepository, Database, LibSqlCollectionRepository, LibSqlFingerprintRepository,
    LibSqlHotGameRepository, LibSqlHotPersonRepository, LibSqlPlayRepository, LibSqlRunRepository,
    RunRecord,
};
use crate::models::{CollectionEntity, CollectionKind, HotGame, HotPerson, SyncOutcome, SyncTarget};
use crate::Result;

/// Row counts and the latest run of every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub database_path: Option<String>,
    pub games: i64,
    pub accessories: i64,
    pub hot_games: i64,
    pub hot_persons: i64,
    pub plays: i64,
    pub fingerprints: i64,
    pub last_runs: Vec<RunRecord>,
}

/// Thread-safe service for DB and repository operations.
///
/// Every write transaction runs while holding the single connection lock.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening database at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem path, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Take the connection lock. Hold it only for the duration of one unit of work.
    pub async fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    pub async fn list_collection(
        &self,
        kind: CollectionKind,
        limit: Option<usize>,
    ) -> Result<Vec<CollectionEntity>> {
        let db = self.db.lock().await;
        LibSqlCollectionRepository::new(db.connection(), kind)
            .list(limit)
            .await
    }

    /// `(entity_id, title)` of every mirrored game
    pub async fn collection_games(&self) -> Result<Vec<(i64, String)>> {
        let db = self.db.lock().await;
        LibSqlCollectionRepository::new(db.connection(), CollectionKind::Games)
            .id_titles()
            .await
    }

    pub async fn list_hot_games(&self, limit: Option<usize>) -> Result<Vec<HotGame>> {
        let db = self.db.lock().await;
        LibSqlHotGameRepository::new(db.connection()).list(limit).await
    }

    pub async fn list_hot_persons(&self, limit: Option<usize>) -> Result<Vec<HotPerson>> {
        let db = self.db.lock().await;
        LibSqlHotPersonRepository::new(db.connection())
            .list(limit)
            .await
    }

    pub async fn record_outcome(&self, outcome: &SyncOutcome) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRunRepository::new(db.connection())
            .record_outcome(outcome)
            .await
    }

    pub async fn record_failure(
        &self,
        target: SyncTarget,
        started_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRunRepository::new(db.connection())
            .record_failure(target, started_at, error)
            .await
    }

    pub async fn status(&self) -> Result<StoreStatus> {
        let db = self.db.lock().await;
        let conn = db.connection();
        Ok(StoreStatus {
            database_path: self
                .db_path
                .as_ref()
                .map(|path| path.display().to_string()),
            games: LibSqlCollectionRepository::new(conn, CollectionKind::Games)
                .count()
                .await?,
            accessories: LibSqlCollectionRepository::new(conn, CollectionKind::Accessories)
                .count()
                .await?,
            hot_games: LibSqlHotGameRepository::new(conn).count().await?,
            hot_persons: LibSqlHotPersonRepository::new(conn).count().await?,
            plays: LibSqlPlayRepository::new(conn).count().await?,
            fingerprints: LibSqlFingerprintRepository::new(conn).count().await?,
            last_runs: LibSqlRunRepository::new(conn).latest_per_target().await?,
        })
    }
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}
