//! Periodic triggers, one task per enabled target.

use std::time::Duration;

use cardboard_core::{SyncOutcome, SyncTarget};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::routes::AppState;

pub fn spawn_schedules(state: &AppState) -> Vec<JoinHandle<()>> {
    SyncTarget::ALL
        .into_iter()
        .filter_map(|target| {
            let period = state.config.schedule.interval(target)?;
            tracing::info!(pipeline = %target, every_secs = period.as_secs(), "Scheduling sync");
            Some(tokio::spawn(run_every(state.clone(), target, period)))
        })
        .collect()
}

async fn run_every(state: AppState, target: SyncTarget, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        run_scheduled(&state, target).await;
    }
}

/// One scheduled run. Busy targets and failures are logged and left for the next tick.
pub async fn run_scheduled(state: &AppState, target: SyncTarget) -> Option<SyncOutcome> {
    let Ok(_permit) = state.guard.try_acquire(target) else {
        tracing::info!(pipeline = %target, "Skipping scheduled sync, previous run still active");
        return None;
    };
    match state.engine.sync(target).await {
        Ok(outcome) => {
            tracing::info!(%outcome, "Scheduled sync finished");
            Some(outcome)
        }
        Err(error) => {
            tracing::warn!(
                pipeline = %target,
                "Scheduled sync failed, retrying next tick: {}",
                error
            );
            None
        }
    }
}
