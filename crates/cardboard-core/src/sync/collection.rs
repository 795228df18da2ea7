//! Collection pipeline for games and accessories.

use std::collections::BTreeSet;

use chrono::Utc;

use super::pipeline::{self, Fetched, Pending};
use super::{bounded_join, reconcile, RunState, RunTracker, SyncContext};
use crate::bgg::{
    collection_request, parse_collection, parse_private_collection, parse_thing,
    private_collection_request, thing_request, CollectionListing, ThingDetail,
};
use crate::config::EmptySnapshotPolicy;
use crate::db::{LibSqlCollectionRepository, SnapshotStore};
use crate::fingerprint::ScopedFingerprints;
use crate::models::{CollectionEntity, CollectionKind, PurchaseInfo, SyncOutcome, SyncTarget};
use crate::util::entity_label;
use crate::{Error, Result};

/// Mirror `username`'s collection of `kind` into the store.
#[tracing::instrument(level = "info", skip(ctx))]
pub async fn sync_collection(
    ctx: &SyncContext,
    kind: CollectionKind,
    username: &str,
) -> Result<SyncOutcome> {
    let target = match kind {
        CollectionKind::Games => SyncTarget::Collection,
        CollectionKind::Accessories => SyncTarget::Accessories,
    };
    let mut tracker = RunTracker::new(target);
    let mut outcome = SyncOutcome::new(target, Utc::now());
    let fingerprints = ScopedFingerprints::new(ctx.fingerprints.clone(), kind.as_str());

    tracker.advance(RunState::ListFetching);
    let request = collection_request(&ctx.endpoints, username, kind);
    let listings = ctx
        .fetcher
        .fetch(&request, parse_collection)
        .await
        .map_err(|error| tracker.fail(Error::from(error)))?;
    outcome.listed = listings.len();

    if listings.is_empty() && ctx.options.empty_snapshot == EmptySnapshotPolicy::Skip {
        tracing::warn!(%kind, "Remote collection is empty, leaving stored rows untouched");
        tracker.finish(0);
        return Ok(outcome.finish());
    }

    let authoritative: BTreeSet<i64> = listings.iter().map(|listing| listing.id).collect();
    let persisted = {
        let db = ctx.db.lock().await;
        LibSqlCollectionRepository::new(db.connection(), kind)
            .select_all_ids()
            .await
    }
    .map_err(|error| tracker.fail(error))?;

    let plan = pipeline::plan(&fingerprints, listings, &persisted, |listing| listing.id).await?;
    outcome.skipped += plan.skipped;
    tracing::info!(
        %kind,
        listed = outcome.listed,
        pending = plan.pending.len(),
        skipped = plan.skipped,
        "Collection list fetched"
    );

    tracker.advance(RunState::DetailFetching);
    let private = ctx.options.fetch_private_fields && ctx.session.is_configured();
    let fetched = bounded_join(plan.pending, ctx.options.detail_concurrency, |pending| {
        fetch_entity(ctx, kind, username, private, pending)
    })
    .await;
    let settled = pipeline::settle(&fingerprints, &persisted, fetched, &mut outcome).await?;

    tracker.advance(RunState::Reconciling);
    let report = {
        let db = ctx.db.lock().await;
        let repo = LibSqlCollectionRepository::new(db.connection(), kind);
        reconcile(&repo, settled.fresh, &authoritative).await
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
    tracker.finish(outcome.failed);

    let outcome = outcome.finish();
    tracing::info!(%outcome, "Collection sync finished");
    Ok(outcome)
}

async fn fetch_entity(
    ctx: &SyncContext,
    kind: CollectionKind,
    username: &str,
    private: bool,
    pending: Pending<CollectionListing>,
) -> Fetched<CollectionEntity> {
    let Pending {
        listing,
        entity_id,
        list_fingerprint,
    } = pending;
    let label = entity_label(listing.title.as_deref(), entity_id);

    let detail = match ctx
        .fetcher
        .fetch(&thing_request(&ctx.endpoints, entity_id), parse_thing)
        .await
    {
        Ok(Some(detail)) => detail,
        Ok(None) => {
            tracing::warn!(entity_id, %label, "Detail page has no item, using list fields only");
            ThingDetail {
                id: entity_id,
                ..ThingDetail::default()
            }
        }
        Err(error) => {
            tracing::warn!(entity_id, %label, "Detail fetch failed: {}", error);
            return Fetched::Failed { entity_id, label };
        }
    };

    let (purchase, complete) = if private {
        match fetch_purchase(ctx, username, entity_id).await {
            Ok(purchase) => (purchase, true),
            Err(error) => {
                tracing::warn!(entity_id, %label, "Private fields unavailable: {}", error);
                (None, false)
            }
        }
    } else {
        (None, true)
    };

    Fetched::Record {
        record: CollectionEntity::from_remote(kind, &listing, &detail, purchase),
        list_fingerprint,
        complete,
    }
}

/// Private fields; `Ok(None)` when the collection has no private entry.
async fn fetch_purchase(
    ctx: &SyncContext,
    username: &str,
    entity_id: i64,
) -> Result<Option<PurchaseInfo>> {
    let request = private_collection_request(&ctx.endpoints, username, entity_id);
    let purchase = ctx
        .session
        .fetch_authorized(&ctx.fetcher, &request, parse_private_collection)
        .await?;
    Ok(purchase.map(|info| info.with_default_currency(ctx.options.default_currency.as_deref())))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::SyncOptions;
    use crate::db::{ChangeSet, CollectionRepository};
    use crate::fingerprint::FingerprintPhase;
    use crate::http::HttpResponse;
    use crate::models::{CurrencySource, RunStatus};
    use crate::test_support::{
        collection_xml, login_ok, private_json, sync_context, thing_xml, StubTransport,
    };

    const USER: &str = "qubus";
    const LIST: &str = "xmlapi2/collection";
    const THING: &str = "xmlapi2/thing";

    fn thing(id: i64) -> String {
        format!("thing?id={id}&")
    }

    fn stub_for(items: &[(i64, &str)]) -> StubTransport {
        let rows: Vec<(i64, &str, u32)> =
            items.iter().map(|(id, title)| (*id, *title, 1)).collect();
        let mut stub = StubTransport::new()
            .route(LIST, vec![HttpResponse::new(200, collection_xml(&rows))]);
        for (id, title) in items {
            stub = stub.route(
                &thing(*id),
                vec![HttpResponse::new(200, thing_xml(*id, title, &["Dice Rolling"]))],
            );
        }
        stub
    }

    async fn seed(ctx: &SyncContext, items: &[(i64, &str)]) {
        let entities = items
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
                inserts: entities,
                ..ChangeSet::default()
            })
            .await
            .unwrap();
    }

    async fn stored_ids(ctx: &SyncContext) -> BTreeSet<i64> {
        let db = ctx.db.lock().await;
        LibSqlCollectionRepository::new(db.connection(), CollectionKind::Games)
            .select_all_ids()
            .await
            .unwrap()
    }

    async fn stored(ctx: &SyncContext, id: i64) -> CollectionEntity {
        let db = ctx.db.lock().await;
        LibSqlCollectionRepository::new(db.connection(), CollectionKind::Games)
            .get(id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_matches_list_snapshot_after_sync() {
        let stub = Arc::new(stub_for(&[(1, "One"), (2, "Two"), (3, "Three")]));
        let ctx = sync_context(&stub, SyncOptions::default()).await;
        seed(&ctx, &[(2, "Two"), (3, "Three"), (4, "Four")]).await;
        ctx.fingerprints
            .set("games", FingerprintPhase::Detail, 4, "stale")
            .await
            .unwrap();

        let outcome = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Committed);
        assert_eq!(outcome.listed, 3);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 2);
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.inserted_labels, vec!["One".to_string()]);
        assert_eq!(outcome.deleted_labels, vec!["Four".to_string()]);
        assert_eq!(stored_ids(&ctx).await, BTreeSet::from([1, 2, 3]));
        assert_eq!(
            ctx.fingerprints
                .get("games", FingerprintPhase::Detail, 4)
                .await
                .unwrap(),
            None
        );
        assert_eq!(stored(&ctx, 1).await.mechanics, vec!["Dice Rolling".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_list_rows_skip_the_detail_endpoint() {
        let stub = Arc::new(stub_for(&[(1, "One"), (2, "Two"), (3, "Three")]));
        let ctx = sync_context(&stub, SyncOptions::default()).await;

        sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();
        assert_eq!(stub.calls_to(THING), 3);

        let second = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();
        assert_eq!(stub.calls_to(THING), 3);
        assert_eq!(second.skipped, 3);
        assert!(!second.has_changes());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_detail_skips_the_write_but_refreshes_list_fingerprint() {
        let stub = Arc::new(stub_for(&[(1, "One"), (2, "Two")]));
        let ctx = sync_context(&stub, SyncOptions::default()).await;
        sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();

        // Force a detail fetch for 1 and mark the stored row so a write would show.
        ctx.fingerprints
            .delete("games", FingerprintPhase::List, 1)
            .await
            .unwrap();
        {
            let db = ctx.db.lock().await;
            db.connection()
                .execute(
                    "UPDATE collection_items SET title = 'Tampered' WHERE entity_id = 1",
                    (),
                )
                .await
                .unwrap();
        }

        let second = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();

        assert_eq!(stub.calls_to(&thing(1)), 2);
        assert_eq!(stub.calls_to(&thing(2)), 1);
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(stored(&ctx, 1).await.title, "Tampered");
        assert!(ctx
            .fingerprints
            .get("games", FingerprintPhase::List, 1)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detail_fetches_respect_the_concurrency_bound() {
        let items: Vec<(i64, String)> = (1..=6).map(|id| (id, format!("Game {id}"))).collect();
        let borrowed: Vec<(i64, &str)> = items
            .iter()
            .map(|(id, title)| (*id, title.as_str()))
            .collect();
        let stub = Arc::new(stub_for(&borrowed).with_delay(Duration::from_millis(20)));
        let options = SyncOptions {
            detail_concurrency: 2,
            ..SyncOptions::default()
        };
        let ctx = sync_context(&stub, options).await;

        let outcome = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();

        assert_eq!(outcome.inserted, 6);
        // The list fetch runs alone, so every overlap comes from detail fetches.
        assert_eq!(stub.max_in_flight(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_auth_rejection_leaves_private_fields_unavailable() {
        let stub = Arc::new(
            stub_for(&[(1, "One")])
                .route("login/api/v1", vec![login_ok()])
                .route("api/collections", vec![HttpResponse::new(401, "")]),
        );
        let options = SyncOptions {
            fetch_private_fields: true,
            ..SyncOptions::default()
        };
        let ctx = sync_context(&stub, options).await;

        let outcome = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Committed);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(ctx.session.login_count(), 2);
        assert_eq!(stub.calls_to("api/collections"), 2);
        assert_eq!(stored(&ctx, 1).await.purchase, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unavailable_private_fields_are_fetched_again_next_run() {
        let stub = Arc::new(
            stub_for(&[(1, "One")])
                .route("login/api/v1", vec![login_ok()])
                .route(
                    "api/collections",
                    vec![
                        HttpResponse::new(401, ""),
                        HttpResponse::new(401, ""),
                        HttpResponse::new(200, private_json("59.00", "EUR")),
                    ],
                ),
        );
        let options = SyncOptions {
            fetch_private_fields: true,
            ..SyncOptions::default()
        };
        let ctx = sync_context(&stub, options).await;

        sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();
        assert_eq!(stored(&ctx, 1).await.purchase, None);

        let second = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();
        assert_eq!(second.skipped, 0);
        assert_eq!(stub.calls_to(THING), 2);
        assert_eq!(stub.calls_to("api/collections"), 3);
        let purchase = stored(&ctx, 1).await.purchase.unwrap();
        assert_eq!(purchase.price_paid, Some(59.0));

        let third = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();
        assert_eq!(third.skipped, 1);
        assert_eq!(stub.calls_to(THING), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn private_fields_are_stored_with_default_currency() {
        let stub = Arc::new(
            stub_for(&[(1, "One")])
                .route("login/api/v1", vec![login_ok()])
                .route(
                    "api/collections",
                    vec![HttpResponse::new(200, private_json("129.90", ""))],
                ),
        );
        let options = SyncOptions {
            fetch_private_fields: true,
            default_currency: Some("PLN".to_string()),
            ..SyncOptions::default()
        };
        let ctx = sync_context(&stub, options).await;

        sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();

        let purchase = stored(&ctx, 1).await.purchase.unwrap();
        assert_eq!(purchase.price_paid, Some(129.9));
        assert_eq!(purchase.currency.as_deref(), Some("PLN"));
        assert_eq!(purchase.currency_source, Some(CurrencySource::Default));
        assert_eq!(ctx.session.login_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_detail_is_not_treated_as_deleted() {
        let stub = Arc::new(
            StubTransport::new()
                .route(
                    LIST,
                    vec![HttpResponse::new(200, collection_xml(&[(1, "One", 1), (2, "Two", 1)]))],
                )
                .route(&thing(1), vec![HttpResponse::new(200, thing_xml(1, "One", &[]))])
                .route(&thing(2), vec![HttpResponse::new(500, "down")]),
        );
        let ctx = sync_context(&stub, SyncOptions::default()).await;
        seed(&ctx, &[(2, "Two")]).await;

        let outcome = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();

        assert_eq!(outcome.status, RunStatus::PartialSuccess);
        assert_eq!(outcome.failed_labels, vec!["Two".to_string()]);
        assert_eq!(outcome.deleted, 0);
        assert_eq!(stored_ids(&ctx).await, BTreeSet::from([1, 2]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_failure_aborts_without_writes() {
        let stub = Arc::new(StubTransport::new().route(LIST, vec![HttpResponse::new(500, "down")]));
        let ctx = sync_context(&stub, SyncOptions::default()).await;
        seed(&ctx, &[(1, "One")]).await;

        let error = sync_collection(&ctx, CollectionKind::Games, USER)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Fetch(_)));
        assert_eq!(stub.calls_to(THING), 0);
        assert_eq!(stored_ids(&ctx).await, BTreeSet::from([1]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_snapshot_policy_controls_mass_deletion() {
        let empty = || HttpResponse::new(200, collection_xml(&[]));

        let stub = Arc::new(StubTransport::new().route(LIST, vec![empty()]));
        let ctx = sync_context(&stub, SyncOptions::default()).await;
        seed(&ctx, &[(1, "One"), (2, "Two")]).await;
        let skipped = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();
        assert_eq!(skipped.deleted, 0);
        assert_eq!(stored_ids(&ctx).await, BTreeSet::from([1, 2]));

        let options = SyncOptions {
            empty_snapshot: EmptySnapshotPolicy::Reconcile,
            ..SyncOptions::default()
        };
        let ctx = sync_context(&stub, options).await;
        seed(&ctx, &[(1, "One"), (2, "Two")]).await;
        let wiped = sync_collection(&ctx, CollectionKind::Games, USER).await.unwrap();
        assert_eq!(wiped.deleted, 2);
        assert!(stored_ids(&ctx).await.is_empty());
    }
}
