//! Closed-world reconciliation of a fresh snapshot into a persisted store.

use std::collections::BTreeSet;

use crate::db::{ChangeSet, Keyed, SnapshotStore};
use crate::Result;

/// What one reconciliation wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub deleted_ids: BTreeSet<i64>,
}

/// Make `store` match the remote snapshot.
///
/// `fresh` records are inserted or updated by id. Persisted ids absent from
/// `authoritative` (the list snapshot, not the subset whose details were
/// fetched) are deleted. Everything commits in one transaction.
pub async fn reconcile<R, S>(
    store: &S,
    fresh: Vec<R>,
    authoritative: &BTreeSet<i64>,
) -> Result<ReconcileReport>
where
    R: Keyed,
    S: SnapshotStore<R>,
{
    let fresh_ids: BTreeSet<i64> = fresh.iter().map(Keyed::key).collect();
    let existing: BTreeSet<i64> = store
        .select_by_ids(&fresh_ids)
        .await?
        .iter()
        .map(Keyed::key)
        .collect();
    let persisted = store.select_all_ids().await?;
    let deletes: BTreeSet<i64> = persisted.difference(authoritative).copied().collect();
    let deleted = if deletes.is_empty() {
        Vec::new()
    } else {
        store
            .select_by_ids(&deletes)
            .await?
            .iter()
            .map(Keyed::label)
            .collect()
    };

    let mut changes = ChangeSet {
        deletes,
        ..ChangeSet::default()
    };
    let mut report = ReconcileReport {
        deleted,
        ..ReconcileReport::default()
    };
    for record in fresh {
        if existing.contains(&record.key()) {
            report.updated.push(record.label());
            changes.updates.push(record);
        } else {
            report.inserted.push(record.label());
            changes.inserts.push(record);
        }
    }

    if !changes.is_empty() {
        store.commit(&changes).await?;
    }
    report.deleted_ids = changes.deletes;

    tracing::debug!(
        inserted = report.inserted.len(),
        updated = report.updated.len(),
        deleted = report.deleted.len(),
        "Reconciled snapshot"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlHotPersonRepository};
    use crate::models::HotPerson;
    use pretty_assertions::assert_eq;

    fn person(id: i64) -> HotPerson {
        HotPerson {
            entity_id: id,
            rank: id,
            name: format!("Person {id}"),
            thumbnail: None,
            url: format!("https://bgg.test/boardgamedesigner/{id}"),
        }
    }

    async fn seed(repo: &LibSqlHotPersonRepository<'_>, ids: &[i64]) {
        repo.commit(&ChangeSet {
            inserts: ids.iter().copied().map(person).collect(),
            ..ChangeSet::default()
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconcile_inserts_updates_and_deletes() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlHotPersonRepository::new(db.connection());
        seed(&repo, &[2, 3, 4]).await;

        let report = reconcile(
            &repo,
            vec![person(1), person(2), person(3)],
            &BTreeSet::from([1, 2, 3]),
        )
        .await
        .unwrap();

        assert_eq!(report.inserted, vec!["Person 1".to_string()]);
        assert_eq!(
            report.updated,
            vec!["Person 2".to_string(), "Person 3".to_string()]
        );
        assert_eq!(report.deleted, vec!["Person 4".to_string()]);
        assert_eq!(report.deleted_ids, BTreeSet::from([4]));
        assert_eq!(repo.select_all_ids().await.unwrap(), BTreeSet::from([1, 2, 3]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_listed_ids_without_fresh_records_survive() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlHotPersonRepository::new(db.connection());
        seed(&repo, &[1, 2]).await;

        // 2 is still listed but its detail was not refetched this run.
        let report = reconcile(&repo, vec![person(1)], &BTreeSet::from([1, 2]))
            .await
            .unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(repo.select_all_ids().await.unwrap(), BTreeSet::from([1, 2]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_snapshot_clears_scope() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlHotPersonRepository::new(db.connection());
        seed(&repo, &[1, 2]).await;

        let report = reconcile(&repo, Vec::<HotPerson>::new(), &BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(report.deleted_ids, BTreeSet::from([1, 2]));
        assert!(repo.select_all_ids().await.unwrap().is_empty());
    }
}
