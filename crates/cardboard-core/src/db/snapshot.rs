//! Store seam used by closed-world reconciliation.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::models::{CollectionEntity, HotGame, HotPerson};

/// A record identified by a numeric remote id.
pub trait Keyed {
    fn key(&self) -> i64;
    fn label(&self) -> String;
}

impl Keyed for CollectionEntity {
    fn key(&self) -> i64 {
        self.entity_id
    }

    fn label(&self) -> String {
        Self::label(self)
    }
}

impl Keyed for HotGame {
    fn key(&self) -> i64 {
        self.entity_id
    }

    fn label(&self) -> String {
        Self::label(self)
    }
}

impl Keyed for HotPerson {
    fn key(&self) -> i64 {
        self.entity_id
    }

    fn label(&self) -> String {
        Self::label(self)
    }
}

/// Every write of one reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<R> {
    pub inserts: Vec<R>,
    pub updates: Vec<R>,
    pub deletes: BTreeSet<i64>,
}

impl<R> Default for ChangeSet<R> {
    fn default() -> Self {
        Self {
            inserts: Vec::new(),
            updates: Vec::new(),
            deletes: BTreeSet::new(),
        }
    }
}

impl<R> ChangeSet<R> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Persisted store for one reconciled table (or one scope of a table).
#[allow(async_fn_in_trait)]
pub trait SnapshotStore<R> {
    /// Ids currently persisted in this scope
    async fn select_all_ids(&self) -> Result<BTreeSet<i64>>;

    /// Persisted records whose id is in `ids`
    async fn select_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<R>>;

    /// Apply inserts, updates and deletes as one transaction
    async fn commit(&self, changes: &ChangeSet<R>) -> Result<()>;
}

/// Ids per statement when expanding an `IN (...)` list.
pub(crate) const ID_CHUNK: usize = 400;
