//! Play history repository

use std::collections::BTreeSet;

use libsql::{Connection, Row, Value};

use super::connection::finish_transaction;
use super::values::{self, RowReader};
use crate::error::Result;
use crate::models::Play;
use crate::util::unix_timestamp_now;

const PLAY_COLUMNS: [&str; 21] = [
    "play_id",
    "user_id",
    "object_type",
    "object_id",
    "tstamp",
    "play_date",
    "quantity",
    "length",
    "location",
    "num_players",
    "length_ms",
    "comments_value",
    "comments_rendered",
    "incomplete",
    "now_in_stats",
    "win_state",
    "online",
    "game_name",
    "players",
    "subtypes",
    "raw",
];

/// Counts from one per-game upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayUpsert {
    pub inserted: usize,
    pub updated: usize,
}

/// libSQL store for logged plays, keyed by `play_id`
pub struct LibSqlPlayRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPlayRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or overwrite every play of one game in a single transaction.
    ///
    /// Plays missing from `plays` are left in place.
    pub async fn upsert_for_game(&self, object_id: i64, plays: &[Play]) -> Result<PlayUpsert> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = self.apply(object_id, plays).await;
        finish_transaction(self.conn, result).await
    }

    async fn apply(&self, object_id: i64, plays: &[Play]) -> Result<PlayUpsert> {
        let existing = self.play_ids_for_game(object_id).await?;
        let synced_at = unix_timestamp_now();
        let columns = PLAY_COLUMNS.join(", ");
        let updates = PLAY_COLUMNS
            .iter()
            .skip(1)
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO plays ({columns}, synced_at) VALUES ({}) \
             ON CONFLICT(play_id) DO UPDATE SET {updates}, synced_at = excluded.synced_at",
            values::placeholders(0, PLAY_COLUMNS.len() + 1)
        );

        let mut outcome = PlayUpsert::default();
        for play in plays {
            self.conn.execute(&sql, play_values(play, synced_at)?).await?;
            if existing.contains(&play.play_id) {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }

    async fn play_ids_for_game(&self, object_id: i64) -> Result<BTreeSet<i64>> {
        let mut rows = self
            .conn
            .query("SELECT play_id FROM plays WHERE object_id = ?1", [object_id])
            .await?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next().await? {
            ids.insert(row.get::<i64>(0)?);
        }
        Ok(ids)
    }

    /// Most recent plays first
    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<Play>> {
        let limit = limit.map_or_else(String::new, |limit| format!(" LIMIT {limit}"));
        let sql = format!(
            "SELECT {} FROM plays ORDER BY play_date DESC, play_id DESC{limit}",
            PLAY_COLUMNS.join(", ")
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut plays = Vec::new();
        while let Some(row) = rows.next().await? {
            plays.push(read_play(&row)?);
        }
        Ok(plays)
    }

    pub async fn count(&self) -> Result<i64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM plays", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }
}

fn play_values(play: &Play, synced_at: i64) -> Result<Vec<Value>> {
    Ok(vec![
        Value::Integer(play.play_id),
        values::integer(play.user_id),
        values::text(play.object_type.as_deref()),
        Value::Integer(play.object_id),
        values::text(play.tstamp.as_deref()),
        values::text(play.play_date.as_deref()),
        values::integer(play.quantity),
        values::integer(play.length),
        values::text(play.location.as_deref()),
        values::integer(play.num_players),
        values::integer(play.length_ms),
        values::text(play.comments_value.as_deref()),
        values::text(play.comments_rendered.as_deref()),
        values::optional_flag(play.incomplete),
        values::optional_flag(play.now_in_stats),
        values::text(play.win_state.as_deref()),
        values::optional_flag(play.online),
        values::text(play.game_name.as_deref()),
        values::json(&play.players)?,
        values::json(&play.subtypes)?,
        values::json(&play.raw)?,
        Value::Integer(synced_at),
    ])
}

fn read_play(row: &Row) -> Result<Play> {
    let mut reader = RowReader::new(row);
    Ok(Play {
        play_id: reader.int()?,
        user_id: reader.opt_int()?,
        object_type: reader.opt_text()?,
        object_id: reader.int()?,
        tstamp: reader.opt_text()?,
        play_date: reader.opt_text()?,
        quantity: reader.opt_int()?,
        length: reader.opt_int()?,
        location: reader.opt_text()?,
        num_players: reader.opt_int()?,
        length_ms: reader.opt_int()?,
        comments_value: reader.opt_text()?,
        comments_rendered: reader.opt_text()?,
        incomplete: reader.opt_flag()?,
        now_in_stats: reader.opt_flag()?,
        win_state: reader.opt_text()?,
        online: reader.opt_flag()?,
        game_name: reader.opt_text()?,
        players: reader.json()?,
        subtypes: reader.json()?,
        raw: reader.json()?,
    })
}
