//! Trending lists: hot games with details, hot persons from the list alone.

use std::collections::BTreeSet;

use chrono::Utc;

use super::pipeline::{self, Fetched, Pending};
use super::{bounded_join, reconcile, RunState, RunTracker, SyncContext};
use crate::bgg::{
    hot_request, parse_hot, parse_thing, thing_request, HotKind, HotListing, ThingDetail,
};
use crate::config::EmptySnapshotPolicy;
use crate::db::{LibSqlHotGameRepository, LibSqlHotPersonRepository, SnapshotStore};
use crate::fingerprint::ScopedFingerprints;
use crate::models::{HotGame, HotPerson, SyncOutcome, SyncTarget};
use crate::util::entity_label;
use crate::{Error, Result};

const SCOPE: &str = "hot";

#[tracing::instrument(level = "info", skip(ctx))]
pub async fn sync_hotness(ctx: &SyncContext) -> Result<SyncOutcome> {
    let mut tracker = RunTracker::new(SyncTarget::Hotness);
    let mut outcome = SyncOutcome::new(SyncTarget::Hotness, Utc::now());
    let fingerprints = ScopedFingerprints::new(ctx.fingerprints.clone(), SCOPE);
    let base_url = ctx.endpoints.base_url.as_str();

    tracker.advance(RunState::ListFetching);
    let games = ctx
        .fetcher
        .fetch(&hot_request(&ctx.endpoints, HotKind::Games), parse_hot)
        .await
        .map_err(|error| tracker.fail(Error::from(error)))?;
    let persons = ctx
        .fetcher
        .fetch(&hot_request(&ctx.endpoints, HotKind::Persons), parse_hot)
        .await
        .map_err(|error| tracker.fail(Error::from(error)))?;
    outcome.listed = games.len() + persons.len();

    let reconcile_games = accept_snapshot(ctx, "games", &games);
    let reconcile_persons = accept_snapshot(ctx, "persons", &persons);

    let game_ids: BTreeSet<i64> = games.iter().map(|listing| listing.id).collect();
    let persisted = {
        let db = ctx.db.lock().await;
        LibSqlHotGameRepository::new(db.connection())
            .select_all_ids()
            .await
    }
    .map_err(|error| tracker.fail(error))?;

    let plan = pipeline::plan(&fingerprints, games, &persisted, |listing| listing.id).await?;
    outcome.skipped += plan.skipped;

    tracker.advance(RunState::DetailFetching);
    let fetched = bounded_join(plan.pending, ctx.options.detail_concurrency, |pending| {
        fetch_hot_game(ctx, base_url, pending)
    })
    .await;
    let settled = pipeline::settle(&fingerprints, &persisted, fetched, &mut outcome).await?;

    tracker.advance(RunState::Reconciling);
    if reconcile_games {
        let report = {
            let db = ctx.db.lock().await;
            let repo = LibSqlHotGameRepository::new(db.connection());
            reconcile(&repo, settled.fresh, &game_ids).await
        }
        .map_err(|error| tracker.fail(error))?;
        pipeline::remember(
            &fingerprints,
            &settled.written,
            &settled.unchanged,
            &settled.incomplete,
            &report.deleted_ids,
        )
        .await;
        pipeline::absorb(&mut outcome, report);
    }

    if reconcile_persons {
        let person_ids: BTreeSet<i64> = persons.iter().map(|listing| listing.id).collect();
        let records: Vec<HotPerson> = persons
            .iter()
            .map(|listing| HotPerson::from_remote(listing, base_url))
            .collect();
        let report = {
            let db = ctx.db.lock().await;
            let repo = LibSqlHotPersonRepository::new(db.connection());
            reconcile(&repo, records, &person_ids).await
        }
        .map_err(|error| tracker.fail(error))?;
        pipeline::absorb(&mut outcome, report);
    }

    tracker.finish(outcome.failed);
    let outcome = outcome.finish();
    tracing::info!(%outcome, "Hotness sync finished");
    Ok(outcome)
}

/// An empty hot list is only reconciled when the policy allows wiping.
fn accept_snapshot(ctx: &SyncContext, list: &str, listings: &[HotListing]) -> bool {
    if listings.is_empty() && ctx.options.empty_snapshot == EmptySnapshotPolicy::Skip {
        tracing::warn!(list, "Remote hot list is empty, leaving stored rows untouched");
        return false;
    }
    true
}

async fn fetch_hot_game(
    ctx: &SyncContext,
    base_url: &str,
    pending: Pending<HotListing>,
) -> Fetched<HotGame> {
    let Pending {
        listing,
        entity_id,
        list_fingerprint,
    } = pending;

    let detail = match ctx
        .fetcher
        .fetch(&thing_request(&ctx.endpoints, entity_id), parse_thing)
        .await
    {
        Ok(detail) => detail.unwrap_or_else(|| ThingDetail {
            id: entity_id,
            ..ThingDetail::default()
        }),
        Err(error) => {
            let label = entity_label(listing.name.as_deref(), entity_id);
            tracing::warn!(entity_id, %label, "Hot game detail fetch failed: {}", error);
            return Fetched::Failed { entity_id, label };
        }
    };

    Fetched::Record {
        record: HotGame::from_remote(&listing, &detail, base_url),
        list_fingerprint,
        complete: true,
    }
}
