//! Stored change-detection fingerprints

use libsql::{Connection, Value};

use crate::error::Result;
use crate::util::unix_timestamp_now;

/// libSQL table backing the fingerprint cache when Redis is not configured
pub struct LibSqlFingerprintRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlFingerprintRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, scope: &str, phase: &str, entity_id: i64) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT fingerprint FROM entity_fingerprints \
                 WHERE scope = ?1 AND phase = ?2 AND entity_id = ?3",
                key_values(scope, phase, entity_id),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    pub async fn set(
        &self,
        scope: &str,
        phase: &str,
        entity_id: i64,
        fingerprint: &str,
    ) -> Result<()> {
        let mut params = key_values(scope, phase, entity_id);
        params.push(Value::Text(fingerprint.to_string()));
        params.push(Value::Integer(unix_timestamp_now()));
        self.conn
            .execute(
                "INSERT INTO entity_fingerprints (scope, phase, entity_id, fingerprint, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(scope, phase, entity_id) \
                 DO UPDATE SET fingerprint = excluded.fingerprint, updated_at = excluded.updated_at",
                params,
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, scope: &str, phase: &str, entity_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM entity_fingerprints WHERE scope = ?1 AND phase = ?2 AND entity_id = ?3",
                key_values(scope, phase, entity_id),
            )
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM entity_fingerprints", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }
}

fn key_values(scope: &str, phase: &str, entity_id: i64) -> Vec<Value> {
    vec![
        Value::Text(scope.to_string()),
        Value::Text(phase.to_string()),
        Value::Integer(entity_id),
    ]
}
