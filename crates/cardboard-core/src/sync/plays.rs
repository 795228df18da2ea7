//! Logged plays for every mirrored game.

use std::collections::BTreeMap;

use chrono::Utc;

use super::{bounded_join, RunState, RunTracker, SyncContext};
use crate::bgg::{parse_plays, plays_request};
use crate::db::LibSqlPlayRepository;
use crate::models::{Play, SyncOutcome, SyncTarget};
use crate::session::AuthError;
use crate::util::entity_label;
use crate::{Error, Result};

/// Fetch and upsert the plays of every stored game.
///
/// Plays are never deleted; a game whose fetch fails keeps what it had.
#[tracing::instrument(level = "info", skip(ctx))]
pub async fn sync_plays(ctx: &SyncContext) -> Result<SyncOutcome> {
    let mut tracker = RunTracker::new(SyncTarget::Plays);
    let mut outcome = SyncOutcome::new(SyncTarget::Plays, Utc::now());

    tracker.advance(RunState::ListFetching);
    if !ctx.session.is_configured() {
        return Err(tracker.fail(Error::from(AuthError::NotConfigured)));
    }
    let games = ctx
        .db
        .collection_games()
        .await
        .map_err(|error| tracker.fail(error))?;
    outcome.listed = games.len();
    tracing::info!(games = games.len(), "Fetching plays");

    tracker.advance(RunState::DetailFetching);
    let fetched = bounded_join(
        games,
        ctx.options.plays_concurrency,
        |(entity_id, title)| async move {
            let plays = fetch_game_plays(ctx, entity_id).await;
            (entity_id, title, plays)
        },
    )
    .await;

    tracker.advance(RunState::Reconciling);
    for (entity_id, title, plays) in fetched {
        let label = entity_label(Some(&title), entity_id);
        let plays = match plays {
            Ok(plays) => plays,
            Err(error) => {
                tracing::warn!(entity_id, %label, "Plays fetch failed: {}", error);
                outcome.record_failure(label);
                continue;
            }
        };
        let upsert = {
            let db = ctx.db.lock().await;
            LibSqlPlayRepository::new(db.connection())
                .upsert_for_game(entity_id, &plays)
                .await
        }
        .map_err(|error| tracker.fail(error))?;
        tracing::debug!(
            entity_id,
            inserted = upsert.inserted,
            updated = upsert.updated,
            "Plays stored"
        );
        outcome.inserted += upsert.inserted;
        outcome.updated += upsert.updated;
    }

    tracker.finish(outcome.failed);
    let outcome = outcome.finish();
    tracing::info!(%outcome, "Plays sync finished");
    Ok(outcome)
}

/// Walk the pages of one game until a short page or the page cap.
async fn fetch_game_plays(ctx: &SyncContext, entity_id: i64) -> Result<Vec<Play>> {
    let page_size = ctx.options.plays_page_size.max(1);
    let mut plays = BTreeMap::new();
    for page in 1..=ctx.options.plays_max_pages.max(1) {
        let request = plays_request(&ctx.endpoints, entity_id, page, page_size);
        let batch = ctx
            .session
            .fetch_authorized(&ctx.fetcher, &request, parse_plays)
            .await?;
        let received = batch.len();
        let before = plays.len();
        for play in batch {
            plays.insert(play.play_id, play);
        }
        if received < page_size {
            break;
        }
        if plays.len() == before {
            tracing::warn!(entity_id, page, "Plays page repeated earlier results, stopping");
            break;
        }
        if page == ctx.options.plays_max_pages {
            tracing::warn!(entity_id, page, "Plays page cap reached");
        }
    }
    Ok(plays.into_values().collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bgg::{CollectionListing, ThingDetail};
    use crate::config::SyncOptions;
    use crate::db::{ChangeSet, LibSqlCollectionRepository, SnapshotStore};
    use crate::http::HttpResponse;
    use crate::models::{CollectionEntity, CollectionKind, RunStatus};
    use crate::session::{InMemorySessionStore, SessionManager};
    use crate::test_support::{login_ok, plays_json, sync_context, StubTransport};

    fn page(id: i64, page: usize) -> String {
        format!("objectid={id}&objecttype=thing&pageID={page}&")
    }

    fn options(page_size: usize, max_pages: usize) -> SyncOptions {
        SyncOptions {
            plays_page_size: page_size,
            plays_max_pages: max_pages,
            ..SyncOptions::default()
        }
    }

    async fn seed_games(ctx: &SyncContext, games: &[(i64, &str)]) {
        let inserts = games
            .iter()
            .map(|(id, title)| {
                let listing = CollectionListing {
                    id: *id,
                    title: Some((*title).to_string()),
                    ..CollectionListing::default()
                };
                CollectionEntity::from_remote(
                    CollectionKind::Games,
                    &listing,
                    &ThingDetail::default(),
                    None,
                )
            })
            .collect();
        let db = ctx.db.lock().await;
        LibSqlCollectionRepository::new(db.connection(), CollectionKind::Games)
            .commit(&ChangeSet {
                inserts,
                ..ChangeSet::default()
            })
            .await
            .unwrap();
    }

    async fn stored_play_count(ctx: &SyncContext) -> i64 {
        let db = ctx.db.lock().await;
        LibSqlPlayRepository::new(db.connection()).count().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn plays_are_paged_and_upserted() {
        let stub = Arc::new(
            StubTransport::new()
                .route("login/api/v1", vec![login_ok()])
                .route(&page(1, 1), vec![HttpResponse::new(200, plays_json(1, &[101, 102]))])
                .route(&page(1, 2), vec![HttpResponse::new(200, plays_json(1, &[103]))]),
        );
        let ctx = sync_context(&stub, options(2, 10)).await;
        seed_games(&ctx, &[(1, "One")]).await;

        let first = sync_plays(&ctx).await.unwrap();
        assert_eq!(first.status, RunStatus::Committed);
        assert_eq!(first.listed, 1);
        assert_eq!(first.inserted, 3);
        assert_eq!(stub.calls_to("geekplay.php"), 2);

        let second = sync_plays(&ctx).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 3);
        assert_eq!(stored_play_count(&ctx).await, 3);
        assert_eq!(ctx.session.login_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn page_cap_stops_paging() {
        let stub = Arc::new(
            StubTransport::new()
                .route("login/api/v1", vec![login_ok()])
                .route(&page(1, 1), vec![HttpResponse::new(200, plays_json(1, &[101]))])
                .route(&page(1, 2), vec![HttpResponse::new(200, plays_json(1, &[102]))])
                .route(&page(1, 3), vec![HttpResponse::new(200, plays_json(1, &[103]))]),
        );
        let ctx = sync_context(&stub, options(1, 2)).await;
        seed_games(&ctx, &[(1, "One")]).await;

        let outcome = sync_plays(&ctx).await.unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(stub.calls_to(&page(1, 3)), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_game_is_skipped_and_reported() {
        let stub = Arc::new(
            StubTransport::new()
                .route("login/api/v1", vec![login_ok()])
                .route(&page(1, 1), vec![HttpResponse::new(200, plays_json(1, &[101]))])
                .route(&page(2, 1), vec![HttpResponse::new(500, "down")]),
        );
        let ctx = sync_context(&stub, options(50, 10)).await;
        seed_games(&ctx, &[(1, "One"), (2, "Two")]).await;

        let outcome = sync_plays(&ctx).await.unwrap();

        assert_eq!(outcome.status, RunStatus::PartialSuccess);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.failed_labels, vec!["Two".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn plays_need_login_credentials() {
        let stub = Arc::new(StubTransport::new());
        let ctx = sync_context(&stub, SyncOptions::default()).await;
        let ctx = SyncContext {
            session: Arc::new(SessionManager::new(
                stub.clone(),
                Arc::new(InMemorySessionStore::new()),
                None,
                ctx.endpoints.login_url.clone(),
                Duration::from_secs(60),
            )),
            ..ctx
        };

        let error = sync_plays(&ctx).await.unwrap_err();

        assert!(matches!(error, Error::Auth(AuthError::NotConfigured)));
        assert_eq!(stub.total_calls(), 0);
    }
}
