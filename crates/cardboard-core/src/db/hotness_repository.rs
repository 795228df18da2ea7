//! Trending list repositories

use std::collections::BTreeSet;

use libsql::{Connection, Row, Value};

use super::connection::finish_transaction;
use super::snapshot::{ChangeSet, SnapshotStore, ID_CHUNK};
use super::values::{self, RowReader};
use crate::error::Result;
use crate::models::{HotGame, HotPerson};
use crate::util::unix_timestamp_now;

const HOT_GAME_COLUMNS: &str = "entity_id, rank, name, year_published, thumbnail, url, \
     description, mechanics, designers, artists, min_players, max_players, playing_time, \
     weight, average_rating, bgg_rank";

const HOT_PERSON_COLUMNS: &str = "entity_id, rank, name, thumbnail, url";

/// libSQL store for the hot games list
pub struct LibSqlHotGameRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlHotGameRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Hot games ordered by list position
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<HotGame>> {
        let limit = limit.map_or_else(String::new, |limit| format!(" LIMIT {limit}"));
        let sql = format!("SELECT {HOT_GAME_COLUMNS} FROM hot_games ORDER BY rank{limit}");
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut games = Vec::new();
        while let Some(row) = rows.next().await? {
            games.push(read_hot_game(&row)?);
        }
        Ok(games)
    }

    pub async fn count(&self) -> Result<i64> {
        count_rows(self.conn, "hot_games").await
    }

    async fn apply(&self, changes: &ChangeSet<HotGame>) -> Result<()> {
        let synced_at = unix_timestamp_now();
        let insert = format!(
            "INSERT INTO hot_games ({HOT_GAME_COLUMNS}, synced_at) VALUES ({})",
            values::placeholders(0, 17)
        );
        let update = "UPDATE hot_games SET rank = ?2, name = ?3, year_published = ?4, \
             thumbnail = ?5, url = ?6, description = ?7, mechanics = ?8, designers = ?9, \
             artists = ?10, min_players = ?11, max_players = ?12, playing_time = ?13, \
             weight = ?14, average_rating = ?15, bgg_rank = ?16, synced_at = ?17 \
             WHERE entity_id = ?1";

        for game in &changes.inserts {
            self.conn
                .execute(&insert, hot_game_values(game, synced_at)?)
                .await?;
        }
        for game in &changes.updates {
            self.conn
                .execute(update, hot_game_values(game, synced_at)?)
                .await?;
        }
        delete_ids(self.conn, "hot_games", &changes.deletes).await
    }
}

impl SnapshotStore<HotGame> for LibSqlHotGameRepository<'_> {
    async fn select_all_ids(&self) -> Result<BTreeSet<i64>> {
        select_ids(self.conn, "hot_games").await
    }

    async fn select_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<HotGame>> {
        let mut games = Vec::with_capacity(ids.len());
        for chunk in chunked(ids) {
            let sql = format!(
                "SELECT {HOT_GAME_COLUMNS} FROM hot_games WHERE entity_id IN ({})",
                values::placeholders(0, chunk.len())
            );
            let mut rows = self.conn.query(&sql, id_values(&chunk)).await?;
            while let Some(row) = rows.next().await? {
                games.push(read_hot_game(&row)?);
            }
        }
        Ok(games)
    }

    async fn commit(&self, changes: &ChangeSet<HotGame>) -> Result<()> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = self.apply(changes).await;
        finish_transaction(self.conn, result).await
    }
}

/// libSQL store for the hot persons list
pub struct LibSqlHotPersonRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlHotPersonRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<HotPerson>> {
        let limit = limit.map_or_else(String::new, |limit| format!(" LIMIT {limit}"));
        let sql = format!("SELECT {HOT_PERSON_COLUMNS} FROM hot_persons ORDER BY rank{limit}");
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut persons = Vec::new();
        while let Some(row) = rows.next().await? {
            persons.push(read_hot_person(&row)?);
        }
        Ok(persons)
    }

    pub async fn count(&self) -> Result<i64> {
        count_rows(self.conn, "hot_persons").await
    }

    async fn apply(&self, changes: &ChangeSet<HotPerson>) -> Result<()> {
        let synced_at = unix_timestamp_now();
        for person in &changes.inserts {
            self.conn
                .execute(
                    "INSERT INTO hot_persons (entity_id, rank, name, thumbnail, url, synced_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    hot_person_values(person, synced_at),
                )
                .await?;
        }
        for person in &changes.updates {
            self.conn
                .execute(
                    "UPDATE hot_persons SET rank = ?2, name = ?3, thumbnail = ?4, url = ?5, \
                     synced_at = ?6 WHERE entity_id = ?1",
                    hot_person_values(person, synced_at),
                )
                .await?;
        }
        delete_ids(self.conn, "hot_persons", &changes.deletes).await
    }
}

impl SnapshotStore<HotPerson> for LibSqlHotPersonRepository<'_> {
    async fn select_all_ids(&self) -> Result<BTreeSet<i64>> {
        select_ids(self.conn, "hot_persons").await
    }

    async fn select_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<HotPerson>> {
        let mut persons = Vec::with_capacity(ids.len());
        for chunk in chunked(ids) {
            let sql = format!(
                "SELECT {HOT_PERSON_COLUMNS} FROM hot_persons WHERE entity_id IN ({})",
                values::placeholders(0, chunk.len())
            );
            let mut rows = self.conn.query(&sql, id_values(&chunk)).await?;
            while let Some(row) = rows.next().await? {
                persons.push(read_hot_person(&row)?);
            }
        }
        Ok(persons)
    }

    async fn commit(&self, changes: &ChangeSet<HotPerson>) -> Result<()> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = self.apply(changes).await;
        finish_transaction(self.conn, result).await
    }
}

fn hot_game_values(game: &HotGame, synced_at: i64) -> Result<Vec<Value>> {
    Ok(vec![
        Value::Integer(game.entity_id),
        Value::Integer(game.rank),
        Value::Text(game.name.clone()),
        values::integer(game.year_published),
        values::text(game.thumbnail.as_deref()),
        Value::Text(game.url.clone()),
        values::text(game.description.as_deref()),
        values::string_list(&game.mechanics)?,
        values::string_list(&game.designers)?,
        values::string_list(&game.artists)?,
        values::integer(game.min_players),
        values::integer(game.max_players),
        values::integer(game.playing_time),
        values::real(game.weight),
        values::real(game.average_rating),
        values::integer(game.bgg_rank),
        Value::Integer(synced_at),
    ])
}

fn hot_person_values(person: &HotPerson, synced_at: i64) -> Vec<Value> {
    vec![
        Value::Integer(person.entity_id),
        Value::Integer(person.rank),
        Value::Text(person.name.clone()),
        values::text(person.thumbnail.as_deref()),
        Value::Text(person.url.clone()),
        Value::Integer(synced_at),
    ]
}

fn read_hot_game(row: &Row) -> Result<HotGame> {
    let mut reader = RowReader::new(row);
    Ok(HotGame {
        entity_id: reader.int()?,
        rank: reader.int()?,
        name: reader.text()?,
        year_published: reader.opt_int()?,
        thumbnail: reader.opt_text()?,
        url: reader.text()?,
        description: reader.opt_text()?,
        mechanics: reader.string_list()?,
        designers: reader.string_list()?,
        artists: reader.string_list()?,
        min_players: reader.opt_int()?,
        max_players: reader.opt_int()?,
        playing_time: reader.opt_int()?,
        weight: reader.opt_real()?,
        average_rating: reader.opt_real()?,
        bgg_rank: reader.opt_int()?,
    })
}

fn read_hot_person(row: &Row) -> Result<HotPerson> {
    let mut reader = RowReader::new(row);
    Ok(HotPerson {
        entity_id: reader.int()?,
        rank: reader.int()?,
        name: reader.text()?,
        thumbnail: reader.opt_text()?,
        url: reader.text()?,
    })
}

fn chunked(ids: &BTreeSet<i64>) -> Vec<Vec<i64>> {
    let ids: Vec<i64> = ids.iter().copied().collect();
    ids.chunks(ID_CHUNK).map(<[i64]>::to_vec).collect()
}

fn id_values(ids: &[i64]) -> Vec<Value> {
    ids.iter().copied().map(Value::Integer).collect()
}

async fn select_ids(conn: &Connection, table: &str) -> Result<BTreeSet<i64>> {
    let mut rows = conn
        .query(&format!("SELECT entity_id FROM {table}"), ())
        .await?;
    let mut ids = BTreeSet::new();
    while let Some(row) = rows.next().await? {
        ids.insert(row.get::<i64>(0)?);
    }
    Ok(ids)
}

async fn delete_ids(conn: &Connection, table: &str, ids: &BTreeSet<i64>) -> Result<()> {
    let sql = format!("DELETE FROM {table} WHERE entity_id = ?1");
    for id in ids {
        conn.execute(&sql, [*id]).await?;
    }
    Ok(())
}

async fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let mut rows = conn
        .query(&format!("SELECT COUNT(*) FROM {table}"), ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}
