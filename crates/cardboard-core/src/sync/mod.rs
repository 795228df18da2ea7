//! Sync pipelines: list snapshot, bounded detail fetch, reconciliation.
//!
//! Every run walks the same states:
//!
//! ```text
//! Idle -> ListFetching -> DetailFetching -> Reconciling -> Committed
//!              |                                 |
//!              +-> Failed                        +-> PartialSuccess
//! ```
//!
//! A failed list fetch aborts the run before anything is written. Per-entity
//! detail failures only demote the final state to `PartialSuccess`.

mod collection;
mod hotness;
mod pipeline;
mod plays;
mod reconciler;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::config::{Endpoints, SyncOptions};
use crate::fingerprint::FingerprintCache;
use crate::http::ResilientFetcher;
use crate::models::SyncTarget;
use crate::services::DatabaseService;
use crate::session::SessionManager;

pub use collection::sync_collection;
pub use hotness::sync_hotness;
pub use plays::sync_plays;
pub use reconciler::{reconcile, ReconcileReport};

/// Everything a pipeline needs, built once per process.
#[derive(Clone)]
pub struct SyncContext {
    pub fetcher: Arc<ResilientFetcher>,
    pub session: Arc<SessionManager>,
    pub db: DatabaseService,
    pub fingerprints: Arc<dyn FingerprintCache>,
    pub endpoints: Endpoints,
    pub options: SyncOptions,
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("db", &self.db)
            .field("fingerprints", &self.fingerprints.backend())
            .field("endpoints", &self.endpoints)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// States of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ListFetching,
    DetailFetching,
    Reconciling,
    Committed,
    PartialSuccess,
    Failed,
}

impl RunState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::PartialSuccess | Self::Failed)
    }
}

/// Logs each state transition of a run.
#[derive(Debug)]
pub(crate) struct RunTracker {
    target: SyncTarget,
    state: RunState,
}

impl RunTracker {
    pub(crate) fn new(target: SyncTarget) -> Self {
        Self {
            target,
            state: RunState::Idle,
        }
    }

    pub(crate) fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: RunState) {
        tracing::info!(
            pipeline = %self.target,
            from = ?self.state,
            to = ?next,
            "Sync state transition"
        );
        self.state = next;
    }

    /// Move to `Failed` and hand the error back to the caller.
    pub(crate) fn fail<E: fmt::Display>(&mut self, error: E) -> E {
        tracing::error!(pipeline = %self.target, "Sync run failed: {}", error);
        self.advance(RunState::Failed);
        error
    }

    pub(crate) fn finish(&mut self, failed: usize) {
        if failed > 0 {
            self.advance(RunState::PartialSuccess);
        } else {
            self.advance(RunState::Committed);
        }
    }
}

/// Run `work` for every item with at most `limit` in flight, then join all.
pub(crate) async fn bounded_join<I, T, F, Fut>(items: Vec<I>, limit: usize, work: F) -> Vec<T>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let tasks = items.into_iter().map(|item| {
        let semaphore = Arc::clone(&semaphore);
        let task = work(item);
        async move {
            // The semaphore is never closed, so acquire cannot fail.
            let _permit = semaphore.acquire().await.ok();
            task.await
        }
    });
    join_all(tasks).await
}
