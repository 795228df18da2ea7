//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, &V1_CATALOGUE).await?;
    }
    if version < 2 {
        apply(conn, 2, &V2_SYNC_BOOKKEEPING).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run one migration's statements and record its version atomically.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }
    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Version 1: mirrored catalogue tables
const V1_CATALOGUE: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS collection_items (
        kind TEXT NOT NULL,
        entity_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        original_title TEXT,
        year_published INTEGER,
        image TEXT,
        thumbnail TEXT,
        description TEXT,
        num_plays INTEGER NOT NULL DEFAULT 0,
        my_rating REAL,
        average_rating REAL,
        bgg_rank INTEGER,
        weight REAL,
        min_players INTEGER,
        max_players INTEGER,
        min_playtime INTEGER,
        max_playtime INTEGER,
        playing_time INTEGER,
        min_age INTEGER,
        item_type TEXT,
        status_owned INTEGER NOT NULL DEFAULT 0,
        status_prev_owned INTEGER NOT NULL DEFAULT 0,
        status_for_trade INTEGER NOT NULL DEFAULT 0,
        status_want INTEGER NOT NULL DEFAULT 0,
        status_want_to_play INTEGER NOT NULL DEFAULT 0,
        status_want_to_buy INTEGER NOT NULL DEFAULT 0,
        status_wishlist INTEGER NOT NULL DEFAULT 0,
        status_preordered INTEGER NOT NULL DEFAULT 0,
        wishlist_priority INTEGER,
        mechanics TEXT NOT NULL DEFAULT '[]',
        designers TEXT NOT NULL DEFAULT '[]',
        artists TEXT NOT NULL DEFAULT '[]',
        publishers TEXT NOT NULL DEFAULT '[]',
        categories TEXT NOT NULL DEFAULT '[]',
        purchase_price_paid REAL,
        purchase_currency TEXT,
        purchase_currency_source TEXT,
        purchase_quantity INTEGER,
        purchase_acquisition_date TEXT,
        purchase_acquired_from TEXT,
        purchase_private_comment TEXT,
        last_modified TEXT,
        synced_at INTEGER NOT NULL,
        PRIMARY KEY (kind, entity_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_collection_items_title ON collection_items(kind, title COLLATE NOCASE)",
    "CREATE TABLE IF NOT EXISTS hot_games (
        entity_id INTEGER PRIMARY KEY,
        rank INTEGER NOT NULL,
        name TEXT NOT NULL,
        year_published INTEGER,
        thumbnail TEXT,
        url TEXT NOT NULL,
        description TEXT,
        mechanics TEXT NOT NULL DEFAULT '[]',
        designers TEXT NOT NULL DEFAULT '[]',
        artists TEXT NOT NULL DEFAULT '[]',
        min_players INTEGER,
        max_players INTEGER,
        playing_time INTEGER,
        weight REAL,
        average_rating REAL,
        bgg_rank INTEGER,
        synced_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS hot_persons (
        entity_id INTEGER PRIMARY KEY,
        rank INTEGER NOT NULL,
        name TEXT NOT NULL,
        thumbnail TEXT,
        url TEXT NOT NULL,
        synced_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS plays (
        play_id INTEGER PRIMARY KEY,
        user_id INTEGER,
        object_type TEXT,
        object_id INTEGER NOT NULL,
        tstamp TEXT,
        play_date TEXT,
        quantity INTEGER,
        length INTEGER,
        location TEXT,
        num_players INTEGER,
        length_ms INTEGER,
        comments_value TEXT,
        comments_rendered TEXT,
        incomplete INTEGER,
        now_in_stats INTEGER,
        win_state TEXT,
        online INTEGER,
        game_name TEXT,
        players TEXT NOT NULL DEFAULT 'null',
        subtypes TEXT NOT NULL DEFAULT 'null',
        raw TEXT NOT NULL DEFAULT 'null',
        synced_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_plays_object ON plays(object_id)",
    "CREATE INDEX IF NOT EXISTS idx_plays_date ON plays(play_date DESC)",
];

/// Version 2: change-detection fingerprints and run history
const V2_SYNC_BOOKKEEPING: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS entity_fingerprints (
        scope TEXT NOT NULL,
        phase TEXT NOT NULL,
        entity_id INTEGER NOT NULL,
        fingerprint TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (scope, phase, entity_id)
    )",
    "CREATE TABLE IF NOT EXISTS sync_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target TEXT NOT NULL,
        status TEXT NOT NULL,
        listed INTEGER NOT NULL DEFAULT 0,
        inserted INTEGER NOT NULL DEFAULT 0,
        updated INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0,
        skipped INTEGER NOT NULL DEFAULT 0,
        failed INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_runs_target ON sync_runs(target, id DESC)",
];
