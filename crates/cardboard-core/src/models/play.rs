//! Logged play model

use serde::{Deserialize, Serialize};

/// One logged play of a game, keyed by the remote `play_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Play {
    pub play_id: i64,
    pub user_id: Option<i64>,
    pub object_type: Option<String>,
    /// Game the play belongs to
    pub object_id: i64,
    /// Remote creation stamp, kept verbatim
    pub tstamp: Option<String>,
    /// `YYYY-MM-DD`
    pub play_date: Option<String>,
    pub quantity: Option<i64>,
    /// Minutes
    pub length: Option<i64>,
    pub location: Option<String>,
    pub num_players: Option<i64>,
    pub length_ms: Option<i64>,
    pub comments_value: Option<String>,
    pub comments_rendered: Option<String>,
    pub incomplete: Option<bool>,
    pub now_in_stats: Option<bool>,
    pub win_state: Option<String>,
    pub online: Option<bool>,
    pub game_name: Option<String>,
    pub players: serde_json::Value,
    pub subtypes: serde_json::Value,
    /// Untouched remote record
    pub raw: serde_json::Value,
}
