//! Sync run history

use chrono::{DateTime, Utc};
use libsql::{Connection, Value};
use serde::{Deserialize, Serialize};

use super::values::RowReader;
use crate::error::Result;
use crate::models::{RunStatus, SyncOutcome, SyncTarget};

/// One recorded run, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub target: String,
    /// `committed`, `partial_success` or `failed`
    pub status: String,
    pub listed: i64,
    pub inserted: i64,
    pub updated: i64,
    pub deleted: i64,
    pub skipped: i64,
    pub failed: i64,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

/// libSQL store for the run history
pub struct LibSqlRunRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRunRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn record_outcome(&self, outcome: &SyncOutcome) -> Result<()> {
        let status = match outcome.status {
            RunStatus::Committed => "committed",
            RunStatus::PartialSuccess => "partial_success",
        };
        self.insert(vec![
            Value::Text(outcome.target.as_str().to_string()),
            Value::Text(status.to_string()),
            count(outcome.listed),
            count(outcome.inserted),
            count(outcome.updated),
            count(outcome.deleted),
            count(outcome.skipped),
            count(outcome.failed),
            Value::Null,
            Value::Text(outcome.started_at.to_rfc3339()),
            Value::Text(outcome.finished_at.to_rfc3339()),
        ])
        .await
    }

    pub async fn record_failure(
        &self,
        target: SyncTarget,
        started_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        self.insert(vec![
            Value::Text(target.as_str().to_string()),
            Value::Text("failed".to_string()),
            Value::Integer(0),
            Value::Integer(0),
            Value::Integer(0),
            Value::Integer(0),
            Value::Integer(0),
            Value::Integer(0),
            Value::Text(error.to_string()),
            Value::Text(started_at.to_rfc3339()),
            Value::Text(Utc::now().to_rfc3339()),
        ])
        .await
    }

    async fn insert(&self, params: Vec<Value>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_runs (target, status, listed, inserted, updated, deleted, \
                 skipped, failed, error, started_at, finished_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params,
            )
            .await?;
        Ok(())
    }

    /// The most recent run of each target, in target order
    pub async fn latest_per_target(&self) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();
        for target in SyncTarget::ALL {
            let mut rows = self
                .conn
                .query(
                    "SELECT target, status, listed, inserted, updated, deleted, skipped, failed, \
                     error, started_at, finished_at FROM sync_runs \
                     WHERE target = ?1 ORDER BY id DESC LIMIT 1",
                    [target.as_str()],
                )
                .await?;
            if let Some(row) = rows.next().await? {
                let mut reader = RowReader::new(&row);
                records.push(RunRecord {
                    target: reader.text()?,
                    status: reader.text()?,
                    listed: reader.int()?,
                    inserted: reader.int()?,
                    updated: reader.int()?,
                    deleted: reader.int()?,
                    skipped: reader.int()?,
                    failed: reader.int()?,
                    error: reader.opt_text()?,
                    started_at: reader.text()?,
                    finished_at: reader.text()?,
                });
            }
        }
        Ok(records)
    }
}

fn count(value: usize) -> Value {
    Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}
