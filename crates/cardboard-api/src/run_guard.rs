use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cardboard_core::SyncTarget;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::AppError;

/// At most one run per target, shared by HTTP triggers and the scheduler.
#[derive(Clone)]
pub struct RunGuard {
    locks: Arc<HashMap<SyncTarget, Arc<Mutex<()>>>>,
    metrics: Arc<RunMetrics>,
}

#[derive(Default)]
struct RunMetrics {
    started: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RunMetricsSnapshot {
    pub started: u64,
    pub rejected: u64,
}

/// Held for the duration of one run.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

impl RunGuard {
    pub fn new() -> Self {
        let locks = SyncTarget::ALL
            .into_iter()
            .map(|target| (target, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            locks: Arc::new(locks),
            metrics: Arc::new(RunMetrics::default()),
        }
    }

    /// Claim `target`, or `Conflict` when a run of it is in progress.
    pub fn try_acquire(&self, target: SyncTarget) -> Result<RunPermit, AppError> {
        let lock = self
            .locks
            .get(&target)
            .ok_or_else(|| AppError::internal(format!("no run lock for {target}")))?;
        match Arc::clone(lock).try_lock_owned() {
            Ok(guard) => {
                self.metrics.started.fetch_add(1, Ordering::Relaxed);
                Ok(RunPermit { _guard: guard })
            }
            Err(_) => {
                self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(pipeline = %target, "Sync already in progress");
                Err(AppError::Conflict(target.to_string()))
            }
        }
    }

    pub fn metrics_snapshot(&self) -> RunMetricsSnapshot {
        RunMetricsSnapshot {
            started: self.metrics.started.load(Ordering::Relaxed),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new()
    }
}
