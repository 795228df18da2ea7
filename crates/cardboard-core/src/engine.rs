//! Process-wide wiring of the sync pipelines.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::{ConfigError, Settings};
use crate::fingerprint::build_fingerprint_cache;
use crate::http::{ReqwestTransport, ResilientFetcher, Transport};
use crate::models::{CollectionKind, SyncOutcome, SyncTarget};
use crate::services::DatabaseService;
use crate::session::{build_session_store, SessionManager};
use crate::sync::{self, SyncContext};
use crate::Result;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the shared fetcher, session, fingerprint cache and database.
///
/// Every run, successful or not, is recorded in `sync_runs`.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    ctx: SyncContext,
    collection_user: Option<String>,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext, collection_user: Option<String>) -> Self {
        Self {
            ctx,
            collection_user,
        }
    }

    /// Build every shared component once, falling back to local backends
    /// when Redis is configured but unreachable.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let db = DatabaseService::open_path(&settings.database_path).await?;
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new(&settings.user_agent, HTTP_TIMEOUT)?);
        let fetcher = Arc::new(ResilientFetcher::new(
            Arc::clone(&transport),
            settings.retry.clone(),
        ));
        let session = Arc::new(SessionManager::new(
            transport,
            build_session_store(settings).await,
            settings.credentials.clone(),
            settings.endpoints.login_url.clone(),
            settings.session_ttl,
        ));
        let fingerprints = build_fingerprint_cache(settings, &db).await;

        tracing::info!(
            fingerprints = fingerprints.backend(),
            private_fields = settings.sync.fetch_private_fields,
            "Sync engine ready"
        );
        Ok(Self::new(
            SyncContext {
                fetcher,
                session,
                db,
                fingerprints,
                endpoints: settings.endpoints.clone(),
                options: settings.sync.clone(),
            },
            settings.collection_user.clone(),
        ))
    }

    pub fn db(&self) -> &DatabaseService {
        &self.ctx.db
    }

    pub async fn sync_collection(&self, kind: CollectionKind) -> Result<SyncOutcome> {
        let target = match kind {
            CollectionKind::Games => SyncTarget::Collection,
            CollectionKind::Accessories => SyncTarget::Accessories,
        };
        self.sync(target).await
    }

    pub async fn sync_hotness(&self) -> Result<SyncOutcome> {
        self.sync(SyncTarget::Hotness).await
    }

    pub async fn sync_plays(&self) -> Result<SyncOutcome> {
        self.sync(SyncTarget::Plays).await
    }

    /// Run one pipeline and record the result.
    pub async fn sync(&self, target: SyncTarget) -> Result<SyncOutcome> {
        let started_at = Utc::now();
        let result = self.run(target).await;
        let recorded = match &result {
            Ok(outcome) => self.ctx.db.record_outcome(outcome).await,
            Err(error) => {
                self.ctx
                    .db
                    .record_failure(target, started_at, &error.to_string())
                    .await
            }
        };
        if let Err(error) = recorded {
            tracing::warn!(pipeline = %target, "Failed to record sync run: {}", error);
        }
        result
    }

    async fn run(&self, target: SyncTarget) -> Result<SyncOutcome> {
        match target.collection_kind() {
            Some(kind) => {
                let user = self.collection_user()?;
                sync::sync_collection(&self.ctx, kind, user).await
            }
            None if target == SyncTarget::Hotness => sync::sync_hotness(&self.ctx).await,
            None => sync::sync_plays(&self.ctx).await,
        }
    }

    fn collection_user(&self) -> Result<&str> {
        self.collection_user
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("BGG_COLLECTION_USER").into())
    }
}
