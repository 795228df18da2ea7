mod config;
mod error;
mod routes;
mod run_guard;
mod scheduler;

use std::sync::Arc;

use cardboard_core::{Settings, SyncEngine};
use config::AppConfig;
use routes::{app_router, AppState};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "cardboard_api=info,cardboard_core=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    let settings = Settings::from_env()?;
    tracing::info!("Starting cardboard-api with config: {:?}", config);

    let engine = SyncEngine::from_settings(&settings).await?;
    let state = AppState::new(config, engine);
    let _schedules = scheduler::spawn_schedules(&state);

    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("cardboard-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
