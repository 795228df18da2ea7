//! Two-tier change detection shared by the detail pipelines.

use std::collections::BTreeSet;

use serde::Serialize;

use super::reconciler::ReconcileReport;
use crate::db::Keyed;
use crate::fingerprint::{fingerprint, FingerprintPhase, ScopedFingerprints};
use crate::models::SyncOutcome;
use crate::Result;

/// A listed entity that needs its detail page.
pub(crate) struct Pending<L> {
    pub listing: L,
    pub entity_id: i64,
    pub list_fingerprint: String,
}

pub(crate) struct Plan<L> {
    pub pending: Vec<Pending<L>>,
    pub skipped: usize,
}

/// One detail fetch, assembled or given up on.
///
/// An incomplete record is written but not fingerprinted, so the next run
/// fetches it again.
pub(crate) enum Fetched<R> {
    Record {
        record: R,
        list_fingerprint: String,
        complete: bool,
    },
    Failed {
        entity_id: i64,
        label: String,
    },
}

/// Fetched records sorted into "write" and "unchanged".
pub(crate) struct Settled<R> {
    pub fresh: Vec<R>,
    /// `(id, list fingerprint, detail fingerprint)` of every record handed to the reconciler
    pub written: Vec<(i64, String, String)>,
    /// `(id, list fingerprint)` of records whose detail fingerprint matched
    pub unchanged: Vec<(i64, String)>,
    /// ids of records written with parts missing
    pub incomplete: Vec<i64>,
}

/// Skip the detail fetch when the list row is unchanged, a detail fingerprint
/// exists, and the row is actually in the store.
pub(crate) async fn plan<L, K>(
    fingerprints: &ScopedFingerprints,
    listings: Vec<L>,
    persisted: &BTreeSet<i64>,
    key: K,
) -> Result<Plan<L>>
where
    L: Serialize,
    K: Fn(&L) -> i64,
{
    let mut plan = Plan {
        pending: Vec::with_capacity(listings.len()),
        skipped: 0,
    };
    for listing in listings {
        let entity_id = key(&listing);
        let list_fingerprint = fingerprint(&listing)?;
        if persisted.contains(&entity_id)
            && fingerprints.lookup(FingerprintPhase::List, entity_id).await.as_deref()
                == Some(list_fingerprint.as_str())
            && fingerprints
                .lookup(FingerprintPhase::Detail, entity_id)
                .await
                .is_some()
        {
            tracing::debug!(
                scope = fingerprints.scope(),
                entity_id,
                "List row unchanged, skipping detail"
            );
            plan.skipped += 1;
            continue;
        }
        plan.pending.push(Pending {
            listing,
            entity_id,
            list_fingerprint,
        });
    }
    Ok(plan)
}

/// Drop records whose detail fingerprint matches the cached one.
pub(crate) async fn settle<R>(
    fingerprints: &ScopedFingerprints,
    persisted: &BTreeSet<i64>,
    fetched: Vec<Fetched<R>>,
    outcome: &mut SyncOutcome,
) -> Result<Settled<R>>
where
    R: Keyed + Serialize,
{
    let mut settled = Settled {
        fresh: Vec::new(),
        written: Vec::new(),
        unchanged: Vec::new(),
        incomplete: Vec::new(),
    };
    for item in fetched {
        match item {
            Fetched::Record {
                record,
                complete: false,
                ..
            } => {
                settled.incomplete.push(record.key());
                settled.fresh.push(record);
            }
            Fetched::Record {
                record,
                list_fingerprint,
                complete: true,
            } => {
                let entity_id = record.key();
                let detail_fingerprint = fingerprint(&record)?;
                let cached = fingerprints
                    .lookup(FingerprintPhase::Detail, entity_id)
                    .await;
                if persisted.contains(&entity_id)
                    && cached.as_deref() == Some(detail_fingerprint.as_str())
                {
                    tracing::debug!(
                        scope = fingerprints.scope(),
                        entity_id,
                        "Detail unchanged, skipping write"
                    );
                    outcome.skipped += 1;
                    settled.unchanged.push((entity_id, list_fingerprint));
                } else {
                    settled
                        .written
                        .push((entity_id, list_fingerprint, detail_fingerprint));
                    settled.fresh.push(record);
                }
            }
            Fetched::Failed { entity_id, label } => {
                tracing::debug!(
                    scope = fingerprints.scope(),
                    entity_id,
                    "Excluded from this run, stored row kept"
                );
                outcome.record_failure(label);
            }
        }
    }
    Ok(settled)
}

/// Persist fingerprints once the reconciliation has committed.
pub(crate) async fn remember(
    fingerprints: &ScopedFingerprints,
    written: &[(i64, String, String)],
    unchanged: &[(i64, String)],
    incomplete: &[i64],
    deleted: &BTreeSet<i64>,
) {
    for (entity_id, list_fingerprint, detail_fingerprint) in written {
        fingerprints
            .store(FingerprintPhase::List, *entity_id, list_fingerprint)
            .await;
        fingerprints
            .store(FingerprintPhase::Detail, *entity_id, detail_fingerprint)
            .await;
    }
    for (entity_id, list_fingerprint) in unchanged {
        fingerprints
            .store(FingerprintPhase::List, *entity_id, list_fingerprint)
            .await;
    }
    for entity_id in incomplete.iter().chain(deleted) {
        fingerprints.forget(*entity_id).await;
    }
}

/// Copy reconciliation counts and labels into the run outcome.
pub(crate) fn absorb(outcome: &mut SyncOutcome, report: ReconcileReport) {
    outcome.inserted += report.inserted.len();
    outcome.updated += report.updated.len();
    outcome.deleted += report.deleted_ids.len();
    outcome.inserted_labels.extend(report.inserted);
    outcome.updated_labels.extend(report.updated);
    outcome.deleted_labels.extend(report.deleted);
}
