use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use cardboard_core::{SyncEngine, SyncOutcome, SyncTarget};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::run_guard::{RunGuard, RunMetricsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: SyncEngine,
    pub guard: RunGuard,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: SyncEngine) -> Self {
        Self {
            config,
            engine,
            guard: RunGuard::new(),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new().route("/sync/{target}", post(trigger_sync));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", sync_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    runs: RunMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        runs: state.guard.metrics_snapshot(),
    })
}

async fn trigger_sync(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<SyncOutcome>, AppError> {
    let target = target.parse::<SyncTarget>().map_err(AppError::bad_request)?;
    let _permit = state.guard.try_acquire(target)?;

    tracing::info!(endpoint = "sync", pipeline = %target, "Sync triggered over HTTP");
    let outcome = state.engine.sync(target).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cardboard_core::http::RetryPolicy;
    use cardboard_core::Settings;
    use tempfile::TempDir;

    use super::*;
    use crate::config::Schedule;

    /// A state whose remote is unreachable, so every run fails quickly.
    async fn offline_state(tmp: &TempDir) -> AppState {
        let mut settings = Settings::from_lookup(|key| match key {
            "BGG_BASE_URL" => Some("http://127.0.0.1:1".to_string()),
            "BGG_COLLECTION_USER" => Some("qubus".to_string()),
            _ => None,
        })
        .unwrap();
        settings.database_path = tmp.path().join("cardboard.db");
        settings.retry = RetryPolicy {
            max_attempts: 1,
            pacing: Duration::ZERO,
            pacing_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let engine = SyncEngine::from_settings(&settings).await.unwrap();
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            schedule: Schedule {
                collection: None,
                accessories: None,
                hotness: None,
                plays: None,
            },
        };
        AppState::new(Arc::new(config), engine)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_target_is_a_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let state = offline_state(&tmp).await;

        let err = trigger_sync(State(state), Path("wishlist".to_string()))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn busy_target_is_a_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let state = offline_state(&tmp).await;
        let _running = state.guard.try_acquire(SyncTarget::Hotness).unwrap();

        let err = trigger_sync(State(state.clone()), Path("hotness".to_string()))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.guard.metrics_snapshot().rejected, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_run_is_a_bad_gateway_and_is_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let state = offline_state(&tmp).await;

        let err = trigger_sync(State(state.clone()), Path("collection".to_string()))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AppError::External(_)));
        let status = state.engine.db().status().await.unwrap();
        assert_eq!(status.last_runs.len(), 1);
        assert_eq!(status.last_runs[0].status, "failed");
        // The permit is released once the run ends.
        state.guard.try_acquire(SyncTarget::Collection).unwrap();
    }
}
